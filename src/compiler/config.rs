use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    #[default]
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// The value of Cranelift's `opt_level` setting.
    pub fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Library-side knobs for one compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub opt_level: OptLevel,
    /// Keep the textual IR of every defined function.
    pub emit_ir: bool,
    /// Searched, in order, for `#include` paths not found next to the including file.
    pub include_dirs: Vec<PathBuf>,
    /// Maximum nesting of macro expansions.
    pub macro_depth_limit: usize,
    /// Run the Cranelift verifier on every function before defining it.
    pub verify: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::None,
            emit_ir: false,
            include_dirs: Vec::new(),
            macro_depth_limit: 64,
            verify: true,
        }
    }
}
