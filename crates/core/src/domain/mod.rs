pub mod node;
pub mod script;

pub use node::{DialogueNode, DialogueTree, NodeId, StructuralPattern, TreeContext, TreeKind};
pub use script::{Escalation, StepScript, StepType, Task};
