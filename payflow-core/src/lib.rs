//! Domain core of the payflow approval workflow.
//!
//! Everything here is synchronous and free of I/O. Persistence and
//! transport live in `payflow-server`.

pub mod actor;
pub mod editability;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod party;
pub mod payload;
pub mod scope;
pub mod status;
pub mod transition;
pub mod validation;

pub use actor::{Actor, Role};
pub use editability::{compute_editable_fields, FieldMask};
pub use envelope::{ApproverStamps, Envelope, EnvelopeRecord, NewEnvelope};
pub use error::{EditError, FieldError, ParseError, ScopeError, TransitionError, ValidationErrors};
pub use ids::{ActorId, DepartmentId, RequestId, TeamId};
pub use party::Party;
pub use payload::{
    AgentRefillPayload, AllocationLine, ExpensesPayload, PayoutPayload, SalaryPayload,
    SubtypePayload,
};
pub use scope::{resolve_scope, ScopeFilter};
pub use status::{
    is_known_status, PayoutStatus, RequestStatus, RequestType, SalaryStatus, Status, StatusFamily,
};
pub use transition::{apply_transition, AppliedTransition, Authority, StatusChange};
pub use validation::{validate_patch, validate_payload, PayloadPatch};
