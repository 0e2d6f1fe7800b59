use crate::ids::ElementId;

/// A pure hierarchical grouping node (spec §3, §6 full-name grammar). Holds
/// no controller state of its own; elements and nested instruments reference
/// their parent by id rather than an instrument owning its children
/// directly, so moving an element between instruments never invalidates the
/// registry's id map.
#[derive(Debug, Clone, Default)]
pub struct InstrumentData {
    pub parent_id: Option<ElementId>,
    /// Instrument class tag (`"NXcollection"`-style strings), free-form and
    /// opaque to the pool.
    pub class_name: String,
}
