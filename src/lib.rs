pub mod compiler;
pub mod error;
pub mod filter;
pub mod model;
pub mod ottl;
pub mod weave;

pub use compiler::{
    compile_pipelines, CompiledPipelines, Strategy, PIPELINE_PROCESSOR_PREFIX,
    UNIFIED_PROCESSOR_NAME,
};
pub use error::{CompileError, WeaveError};
pub use filter::{FieldScope, FilterCombinator, FilterItem, FilterKey, FilterOperator, FilterSet};
pub use model::{Operator, OperatorKind, Pipeline, TimeLayoutType};
pub use weave::{is_owned_processor, weave_pipelines_into_config};
