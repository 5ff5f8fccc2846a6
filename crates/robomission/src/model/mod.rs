pub mod ids;
pub mod inspection;
pub mod mission;
pub mod pose;
pub mod robot;
pub mod task;

pub use ids::{InspectionId, MissionId, TaskId};
pub use inspection::*;
pub use mission::*;
pub use pose::*;
pub use robot::*;
pub use task::*;
