//! Foreign consumers loaded from shared libraries
//!
//! A consumer library exports one function taking the callback table:
//!
//! ```c
//! int consume_image(const CallbackTable *table);
//! ```
//!
//! It is called once per round and drives the table itself. A non-zero return
//! value is reported as a failed round.

use crate::config::ConsumerConfig;
use anyhow::{Context, Result};
use image_export_bridge::CallbackTable;
use libloading::{Library, Symbol};
use std::os::raw::c_int;
use std::path::{Path, PathBuf};

type ConsumeFn = unsafe extern "C" fn(table: *const CallbackTable) -> c_int;

/// A loaded consumer entry point. The library stays loaded for as long as this
/// value lives.
pub struct ForeignConsumer {
    entry: ConsumeFn,
    path: PathBuf,
    symbol: String,
    // Declared last so the entry point never outlives the library.
    _library: Library,
}

impl ForeignConsumer {
    /// Load `config.library` and resolve `config.symbol`
    ///
    /// # Safety
    ///
    /// Loading a library runs its initializers, and the symbol must really have
    /// the `ConsumeFn` signature. Only load trusted consumers.
    pub unsafe fn load(config: &ConsumerConfig) -> Result<Self> {
        let library = Library::new(&config.library)
            .with_context(|| format!("Failed to load consumer library: {:?}", config.library))?;

        let entry = {
            let symbol: Symbol<ConsumeFn> = library
                .get(config.symbol.as_bytes())
                .with_context(|| {
                    format!(
                        "Symbol '{}' not found in consumer library {:?}",
                        config.symbol, config.library
                    )
                })?;
            *symbol
        };

        log::info!("Loaded consumer '{}' from {:?}", config.symbol, config.library);
        Ok(Self {
            entry,
            path: config.library.clone(),
            symbol: config.symbol.clone(),
            _library: library,
        })
    }

    /// Hand `table` to the consumer and return its status code
    pub fn consume(&self, table: &CallbackTable) -> i32 {
        log::debug!("Calling consumer '{}'", self.symbol);
        // SAFETY: the signature was asserted at load time and `table` outlives
        // the call.
        unsafe { (self.entry)(table as *const CallbackTable) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}
