#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("pipeline '{alias}': {source}")]
    Pipeline {
        alias: String,
        #[source]
        source: Box<CompileError>,
    },

    #[error("operator '{operator}': {source}")]
    Operator {
        operator: String,
        #[source]
        source: Box<CompileError>,
    },

    #[error("unsupported strptime directive(s) {directives:?} in layout '{layout}'")]
    UnsupportedLayoutDirective {
        layout: String,
        directives: Vec<String>,
    },

    #[error("unsupported time_parser layout type '{0}'")]
    UnsupportedLayoutType(String),

    #[error("invalid field path '{path}': {reason}")]
    InvalidFieldPath { path: String, reason: String },

    #[error("invalid {kind} operator: {reason}")]
    InvalidOperator { kind: String, reason: String },

    #[error("failed to translate pipeline filter: {0}")]
    FilterTranslation(String),
}

impl CompileError {
    /// Attach the name of the operator being compiled.
    pub fn in_operator(self, operator: &str) -> CompileError {
        CompileError::Operator {
            operator: operator.to_string(),
            source: Box::new(self),
        }
    }

    /// Attach the alias of the pipeline being compiled.
    pub fn in_pipeline(self, alias: &str) -> CompileError {
        CompileError::Pipeline {
            alias: alias.to_string(),
            source: Box::new(self),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WeaveError {
    #[error("inconsistent processor sequence: '{name}' would appear more than once")]
    InconsistentProcessorSequence {
        name: String,
        /// The untouched current sequence, so callers can abort the
        /// deployment instead of applying a corrupted order.
        current: Vec<String>,
    },

    #[error("malformed collector config: {0}")]
    MalformedConfig(String),
}
