//! ---
//! oph_section: "05-operator-api"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Operator lifecycle contracts and stream element types."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use crate::element::{StreamRecord, Watermark};

/// Sink an operator emits into.
///
/// Records are passed by reference: the sink takes whatever copy it needs,
/// so the operator may keep reusing its own record buffer afterwards.
pub trait Output<T>: Send {
    fn collect(&mut self, record: &StreamRecord<T>);

    fn emit_watermark(&mut self, mark: Watermark);

    fn close(&mut self) {}
}
