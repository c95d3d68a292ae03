//! ect: typed operations and workflow graphs
//!
//! Operations are registered under a name with a signature describing their
//! inputs and outputs. They can be called directly through the [`Registry`]
//! or composed into a [`Graph`], which runs its steps in dependency order and
//! reports progress through a [`Monitor`].

mod dispatch;
mod error;
mod executor;
mod geometry;
mod graph;
mod literal;
mod monitor;
mod registry;
mod signature;
mod table;
mod types;
mod value;
mod workflow;

pub use dispatch::{bind_arguments, dispatch};
pub use error::{Error, OpError, Result};
pub use geometry::Geometry;
pub use graph::{
    BindingDef, GraphDef, InputDef, OutputDef, SourceDef, StepDef, ValueDef, detect_format,
};
pub use literal::parse_literal;
pub use monitor::{CancelFlag, ChildMonitor, ConsoleMonitor, Monitor, NullMonitor};
pub use registry::{Operation, Registry};
pub use signature::{Arguments, Callable, InputSpec, OpOutput, OpSignature, OutputSpec, RETURN};
pub use table::{DataFrame, GeoDataFrame, Row, Table, Tabular};
pub use types::{DataType, validate_var_name, value_set};
pub use value::Value;
pub use workflow::{Binding, Graph, Port, PortRef, Step};
