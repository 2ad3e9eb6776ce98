#[derive(thiserror::Error, Debug)]
pub enum ShapeError {
    #[error("cannot extract a concrete value from a symbolic integer; call guard_int to force evaluation")]
    DirectIntExtraction,
    #[error("dispatch mode has already been entered once; construct a fresh mode")]
    ModeReused,
    #[error("evaluation of `{expr}` failed with {guards} guards recorded: {message}")]
    Internal {
        expr: String,
        guards: usize,
        message: String,
    },
}
