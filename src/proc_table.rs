//! Dynamic entry point resolution and extension availability caching.
//!
//! Every context owns a table of resolved extension entry points and a cache
//! of extension availability booleans. Both are scoped to the native context
//! and rebuilt wholesale every time the context is (re)created; addresses and
//! extension sets are a property of the driver state behind a context, not of
//! the process.
//!
//! The early core API is the exception: those symbols come from the system GL
//! library, are assumed stable across every context, and are resolved exactly
//! once per process.

use std::collections::HashSet;
use std::ffi::c_void;

use once_cell::sync::OnceCell;

use crate::api::Driver;

/// Functions of the early core API. These are exported statically by the
/// system GL library and need no dynamic per-context resolution.
const CORE_FUNCTIONS: &[&str] = &[
    "glBindTexture",
    "glClear",
    "glClearColor",
    "glDeleteTextures",
    "glDepthFunc",
    "glDisable",
    "glDrawArrays",
    "glDrawElements",
    "glEnable",
    "glFinish",
    "glFlush",
    "glGenTextures",
    "glGetError",
    "glGetIntegerv",
    "glGetString",
    "glReadPixels",
    "glTexImage2D",
    "glTexParameteri",
    "glViewport",
];

/// Declares the table of dynamically resolved commands: one enum variant per
/// slot, with the native symbol and the extension that introduces it.
macro_rules! commands {
    ($($command:ident => ($symbol:literal, $extension:expr),)+) => {
        /// A dynamically resolved entry point slot.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(usize)]
        pub enum Command {
            $($command,)+
        }

        impl Command {
            pub(crate) const ALL: &'static [Command] = &[$(Command::$command,)+];
            pub(crate) const COUNT: usize = Self::ALL.len();

            /// The generic symbol name of the command.
            pub fn symbol(self) -> &'static str {
                match self {
                    $(Command::$command => $symbol,)+
                }
            }

            /// The extension the command belongs to.
            pub fn extension(self) -> Option<&'static str> {
                match self {
                    $(Command::$command => $extension,)+
                }
            }

            pub(crate) fn from_symbol(symbol: &str) -> Option<Command> {
                Self::ALL.iter().copied().find(|command| command.symbol() == symbol)
            }
        }
    };
}

commands! {
    ActiveTextureARB => ("glActiveTextureARB", Some("GL_ARB_multitexture")),
    ClientActiveTextureARB => ("glClientActiveTextureARB", Some("GL_ARB_multitexture")),
    SampleCoverageARB => ("glSampleCoverageARB", Some("GL_ARB_multisample")),
    BindBufferARB => ("glBindBufferARB", Some("GL_ARB_vertex_buffer_object")),
    DeleteBuffersARB => ("glDeleteBuffersARB", Some("GL_ARB_vertex_buffer_object")),
    GenBuffersARB => ("glGenBuffersARB", Some("GL_ARB_vertex_buffer_object")),
    BufferDataARB => ("glBufferDataARB", Some("GL_ARB_vertex_buffer_object")),
    MapBufferARB => ("glMapBufferARB", Some("GL_ARB_vertex_buffer_object")),
    UnmapBufferARB => ("glUnmapBufferARB", Some("GL_ARB_vertex_buffer_object")),
    GenQueriesARB => ("glGenQueriesARB", Some("GL_ARB_occlusion_query")),
    DeleteQueriesARB => ("glDeleteQueriesARB", Some("GL_ARB_occlusion_query")),
    CompileShaderARB => ("glCompileShaderARB", Some("GL_ARB_shader_objects")),
    GenFramebuffersEXT => ("glGenFramebuffersEXT", Some("GL_EXT_framebuffer_object")),
    BindFramebufferEXT => ("glBindFramebufferEXT", Some("GL_EXT_framebuffer_object")),
    DeleteFramebuffersEXT => ("glDeleteFramebuffersEXT", Some("GL_EXT_framebuffer_object")),
    BlendFuncSeparateEXT => ("glBlendFuncSeparateEXT", Some("GL_EXT_blend_func_separate")),
    AllocateMemoryNV => ("glAllocateMemoryNV", Some("GL_NV_vertex_array_range")),
    FreeMemoryNV => ("glFreeMemoryNV", Some("GL_NV_vertex_array_range")),
}

/// The resolved entry point addresses of one context.
///
/// Slots are indexed by [`Command`]; an unresolvable symbol resolves to the
/// null sentinel rather than failing the whole table.
pub(crate) struct ProcTable {
    slots: [*const c_void; Command::COUNT],
}

// Addresses are resolved once at construction and never mutated.
unsafe impl Send for ProcTable {}
unsafe impl Sync for ProcTable {}

impl std::fmt::Debug for ProcTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolved = self.slots.iter().filter(|slot| !slot.is_null()).count();
        f.debug_struct("ProcTable").field("resolved", &resolved).finish()
    }
}

impl ProcTable {
    /// Resolve every declared slot through the driver, applying the platform
    /// name mapping before each lookup.
    pub(crate) fn load(driver: &dyn Driver) -> Self {
        let mut slots = [std::ptr::null(); Command::COUNT];
        for &command in Command::ALL {
            let symbol = command.symbol();
            let native = driver.map_symbol(symbol).unwrap_or(symbol);
            slots[command as usize] = driver.get_proc_address(native);
        }

        let resolved = slots.iter().filter(|slot| !slot.is_null()).count();
        log::debug!("resolved {resolved}/{} dynamic entry points", Command::COUNT);

        ProcTable { slots }
    }

    pub(crate) fn get(&self, command: Command) -> *const c_void {
        self.slots[command as usize]
    }
}

/// Extension availability of one context, parsed from the space separated
/// extension strings the context reports.
#[derive(Debug)]
pub(crate) struct FunctionAvailabilityCache {
    gl_extensions: HashSet<String>,
    platform_extensions: HashSet<String>,
}

impl FunctionAvailabilityCache {
    /// Snapshot the extension sets of the current context.
    pub(crate) fn load(driver: &dyn Driver) -> Self {
        let split = |extensions: String| {
            extensions.split_whitespace().map(str::to_owned).collect::<HashSet<_>>()
        };

        FunctionAvailabilityCache {
            gl_extensions: split(driver.gl_extensions()),
            platform_extensions: split(driver.platform_extensions()),
        }
    }

    pub(crate) fn is_extension_available(&self, extension: &str) -> bool {
        self.gl_extensions.contains(extension) || self.platform_extensions.contains(extension)
    }

    /// Whether the named function can be called on this context.
    ///
    /// Early core functions are always available. Everything else must be a
    /// declared command whose governing extension the context reports; a
    /// command whose extension is reported but whose address failed to
    /// resolve indicates driver table corruption and is a programming error,
    /// not a recoverable condition.
    pub(crate) fn is_function_available(&self, name: &str, table: &ProcTable) -> bool {
        if CORE_FUNCTIONS.contains(&name) {
            return true;
        }

        let Some(command) = Command::from_symbol(name) else {
            return false;
        };

        if let Some(extension) = command.extension() {
            if !self.is_extension_available(extension) {
                return false;
            }
        }

        let address = table.get(command);
        assert!(
            !address.is_null(),
            "{name} is advertised by the driver but has no resolved entry point",
        );
        true
    }
}

/// The process wide early core entry points.
///
/// Resolved through whichever driver first asks for them and reused by every
/// context afterwards; the system GL library does not change underneath a
/// running process.
pub(crate) struct CoreEntryPoints {
    addresses: Vec<(&'static str, *const c_void)>,
}

unsafe impl Send for CoreEntryPoints {}
unsafe impl Sync for CoreEntryPoints {}

impl std::fmt::Debug for CoreEntryPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreEntryPoints").field("count", &self.addresses.len()).finish()
    }
}

static CORE_ENTRY_POINTS: OnceCell<CoreEntryPoints> = OnceCell::new();

pub(crate) fn core_entry_points(driver: &dyn Driver) -> &'static CoreEntryPoints {
    CORE_ENTRY_POINTS.get_or_init(|| {
        let addresses = CORE_FUNCTIONS
            .iter()
            .map(|&symbol| (symbol, driver.get_proc_address(symbol)))
            .collect();
        CoreEntryPoints { addresses }
    })
}

impl CoreEntryPoints {
    pub(crate) fn get(&self, name: &str) -> *const c_void {
        self.addresses
            .iter()
            .find(|(symbol, _)| *symbol == name)
            .map_or(std::ptr::null(), |(_, address)| *address)
    }

    pub(crate) fn contains(name: &str) -> bool {
        CORE_FUNCTIONS.contains(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_slots_are_declared_consistently() {
        for &command in Command::ALL {
            assert_eq!(Command::from_symbol(command.symbol()), Some(command));
        }
        assert_eq!(Command::from_symbol("glNotARealFunction"), None);
    }
}
