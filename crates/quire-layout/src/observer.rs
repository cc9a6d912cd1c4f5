use crate::tree::NodeId;

/// Observes changes of the reading order between content frames.
///
/// Accessibility layers keep "next/previous readable unit" relations between
/// content frames. The layout calls the observer before it detaches a section
/// frame, so that relations spanning the frame can be rebuilt while both ends
/// are still alive.
pub trait FlowObserver {
    /// The relation between `prev` and `next` is about to change.
    fn flow_relation_changed(&mut self, next: Option<NodeId>, prev: Option<NodeId>);
}
