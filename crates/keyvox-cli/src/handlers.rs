//! Command handlers for CLI subcommands
//!
//! This module contains the implementation logic for each CLI subcommand.

mod completions;
mod limits;
mod secret;
mod sign;
mod synthesize;
mod vault;

pub use completions::handle_completions;
pub use limits::handle_limits;
pub use secret::handle_secret;
pub use sign::handle_sign;
pub use synthesize::handle_synthesize;
pub use vault::handle_vault;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::timing::Timer;
use crate::output::OutputWriter;
use keyvox_core::{FileStore, ProviderGateway};
use tracing::debug;

/// Gateway over the configured vault file
pub(crate) fn open_gateway(config: &Config) -> Result<ProviderGateway<FileStore>> {
    debug!(path = %config.vault.path.display(), "Opening vault store");
    let store = FileStore::open(&config.vault.path)?;
    Ok(ProviderGateway::new(store, config.gateway_config())?)
}

/// Unlock an existing vault; never creates one
pub(crate) async fn unlock(
    gateway: &ProviderGateway<FileStore>,
    config: &Config,
    password: &str,
    output: &mut OutputWriter,
) -> Result<()> {
    if !gateway.vault().is_initialized()? {
        return Err(Error::VaultMissing {
            path: config.vault.path.clone(),
        });
    }

    let spinner = output.spinner("Unlocking vault...");
    let unlocked = {
        let _timer = Timer::new("vault_unlock");
        gateway.initialize_vault(password).await
    };
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    Ok(unlocked?)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::cli::OutputFormat;
    use crate::config::Config;
    use crate::output::OutputWriter;
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::path::Path;
    use std::rc::Rc;

    /// Config with a vault under `dir` and fast key derivation
    pub fn config_in(dir: &Path) -> Config {
        let mut config = Config::default().with_vault_path(Some(dir.join("vault.json")));
        config.vault.kdf_iterations = 1_000;
        config
    }

    #[derive(Clone, Default)]
    pub struct Captured(Rc<RefCell<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    pub fn capture(format: OutputFormat) -> (OutputWriter, Captured) {
        let captured = Captured::default();
        let writer = OutputWriter::with_writer(format, false, false, 0, Box::new(captured.clone()));
        (writer, captured)
    }
}
