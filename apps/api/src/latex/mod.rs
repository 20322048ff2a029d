// LaTeX handling: repair of model output, the deterministic fallback document,
// and the external compiler invocation.

pub mod compiler;
pub mod sanitizer;
pub mod template;

pub use compiler::{CompilationJob, CompileError, LatexCompiler};
pub use sanitizer::sanitize_latex;
