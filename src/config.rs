/// Interpreter limits and switches.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deepest allowed nesting of user function calls. The evaluator grows
    /// its stack on demand, so this bounds runaway recursion, not host stack.
    pub max_call_depth: usize,
    /// Reclaim unreachable captured frames between top-level statements.
    pub collect_garbage: bool,
}

impl Config {
    pub const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_call_depth: Self::DEFAULT_MAX_CALL_DEPTH,
            collect_garbage: true,
        }
    }
}
