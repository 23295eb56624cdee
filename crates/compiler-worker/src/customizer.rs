//! Compiler-specific extra arguments.
//!
//! Compiler front-ends sharing this worker accept the same path-remapping
//! option under different spellings. [`PathMapCustomizer`] resolves the
//! spelling from a table keyed on the compiler's file name, so supporting a
//! new front-end means adding a [`CompilerFamily`] rather than touching the
//! dispatcher.

use std::ffi::{OsStr, OsString};
use std::path::Path;

/// Supplies arguments appended to every compiler invocation.
///
/// Implementations must be pure: the result depends only on the inputs.
pub trait ArgumentCustomizer: Send + Sync {
    /// Returns the extra arguments for `compiler`, remapping `base_dir`.
    fn extra_arguments(&self, compiler: &Path, base_dir: &Path) -> Vec<OsString>;
}

/// Path-map flag spelling used when no family matches.
pub const DEFAULT_PATHMAP_FLAG: &str = "-pathmap";

/// Path-map flag spelling used by the F# front-end.
pub const FSHARP_PATHMAP_FLAG: &str = "--pathmap";

/// A compiler front-end recognised by the file name of its entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerFamily {
    file_name: String,
    flag: String,
}

impl CompilerFamily {
    /// Declares that compilers named `file_name` spell the option as `flag`.
    #[must_use]
    pub fn new(file_name: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            flag: flag.into(),
        }
    }

    fn matches(&self, compiler: &Path) -> bool {
        compiler
            .file_name()
            .is_some_and(|name| name == OsStr::new(&self.file_name))
    }
}

/// Appends `<flag>:<base_dir>=.` so diagnostics and debug info use
/// sandbox-independent paths.
///
/// ```
/// use std::path::Path;
///
/// use compiler_worker::{ArgumentCustomizer, PathMapCustomizer};
///
/// let customizer = PathMapCustomizer::default();
/// let args = customizer.extra_arguments(Path::new("/sdk/fsc.dll"), Path::new("/work"));
/// assert_eq!(args, vec![std::ffi::OsString::from("--pathmap:/work=.")]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapCustomizer {
    families: Vec<CompilerFamily>,
    default_flag: String,
}

impl Default for PathMapCustomizer {
    fn default() -> Self {
        Self {
            families: vec![
                CompilerFamily::new("fsc.dll", FSHARP_PATHMAP_FLAG),
                CompilerFamily::new("fsc.exe", FSHARP_PATHMAP_FLAG),
                CompilerFamily::new("fsc", FSHARP_PATHMAP_FLAG),
            ],
            default_flag: String::from(DEFAULT_PATHMAP_FLAG),
        }
    }
}

impl PathMapCustomizer {
    /// Adds a family; later entries take precedence over earlier ones.
    #[must_use]
    pub fn with_family(mut self, family: CompilerFamily) -> Self {
        self.families.push(family);
        self
    }

    /// Returns the flag spelling used for `compiler`.
    #[must_use]
    pub fn flag_for(&self, compiler: &Path) -> &str {
        self.families
            .iter()
            .rev()
            .find(|family| family.matches(compiler))
            .map_or(self.default_flag.as_str(), |family| family.flag.as_str())
    }
}

impl ArgumentCustomizer for PathMapCustomizer {
    fn extra_arguments(&self, compiler: &Path, base_dir: &Path) -> Vec<OsString> {
        let mut argument = OsString::from(self.flag_for(compiler));
        argument.push(":");
        argument.push(base_dir);
        argument.push("=.");
        vec![argument]
    }
}

/// Customizer that appends nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtraArguments;

impl ArgumentCustomizer for NoExtraArguments {
    fn extra_arguments(&self, _compiler: &Path, _base_dir: &Path) -> Vec<OsString> {
        Vec::new()
    }
}
