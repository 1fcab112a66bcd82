//! Plugin trait definitions

use super::communication::Communication;

/// Core plugin trait that all plugins must implement
pub trait Plugin: Send + Sync {
    /// Receive the plugin's end of its channel. Called right after the plugin
    /// is created and before `install`. A plugin may spawn its own listener here.
    fn set_communication(&mut self, comm: Communication);

    /// Plugin-specific setup. There is no error return: failures should be
    /// reported over the channel.
    fn install(&mut self);

    /// Release plugin-owned resources before the plugin is dropped
    fn uninstall(&mut self);

    /// Unique identifier, used as the registry key
    fn name(&self) -> &str;

    /// Informational version string
    fn version(&self) -> &str;
}

/// Factory exported by every plugin library
pub type PluginCreateFn = fn() -> Box<dyn Plugin>;

/// Symbol under which a plugin library exports its [`PluginDeclaration`]
pub const ENTRY_SYMBOL: &str = "relay_plugin_entry";

pub const PLUGIN_MAGIC: u32 = 0x414d_4144;

/// Bumped whenever `Plugin` or `PluginDeclaration` change shape
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Host crate version; plugins must be built against the same one
pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Static descriptor a plugin library exports under [`ENTRY_SYMBOL`]
#[repr(C)]
pub struct PluginDeclaration {
    pub magic: u32,
    pub abi_version: u32,
    pub api_version: &'static str,
    pub create: PluginCreateFn,
}

impl PluginDeclaration {
    /// Check the declaration was built for this host.
    pub fn validate(&self) -> Result<(), String> {
        if self.magic != PLUGIN_MAGIC {
            return Err(format!("bad magic number {:#x}", self.magic));
        }
        if self.abi_version != PLUGIN_ABI_VERSION {
            return Err(format!(
                "ABI version mismatch (expected {}, found {})",
                PLUGIN_ABI_VERSION, self.abi_version
            ));
        }
        if self.api_version != API_VERSION {
            return Err(format!(
                "host API version mismatch (expected {}, found {})",
                API_VERSION, self.api_version
            ));
        }
        Ok(())
    }
}

/// Export a plugin's entry point.
///
/// ```ignore
/// amadeus_relay::declare_plugin!(MyPlugin::new);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($constructor:path) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static relay_plugin_entry: $crate::plugins::PluginDeclaration =
            $crate::plugins::PluginDeclaration {
                magic: $crate::plugins::PLUGIN_MAGIC,
                abi_version: $crate::plugins::PLUGIN_ABI_VERSION,
                api_version: $crate::plugins::API_VERSION,
                create: {
                    fn __relay_create_plugin() -> ::std::boxed::Box<dyn $crate::plugins::Plugin> {
                        ::std::boxed::Box::new($constructor())
                    }
                    __relay_create_plugin
                },
            };
    };
}
