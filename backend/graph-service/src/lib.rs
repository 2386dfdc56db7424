pub mod config;
pub mod domain;
pub mod error;
pub mod graph;

pub use config::GraphConfig;
pub use domain::edge::{edge_id, ConnectionEdge, EdgeParseError, EdgeStatus};
pub use domain::state::{ConnectionStatus, RelationAction, RelationState, TransitionError};
pub use error::{GraphError, GraphResult};
pub use graph::ConnectionGraph;
