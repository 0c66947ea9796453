//! Client side of the background remover: session gate, image workflow, and
//! the collaborators they talk to (auth provider, remote processor).

pub mod auth;
pub mod error;
pub mod gate;
pub mod processor;
pub mod workflow;

pub use auth::{
    AuthProvider, GoTrueAuthProvider, InMemoryAuthProvider, SessionChange, SessionChangeKind,
    SessionFileStore, SessionSubscription,
};
pub use error::{AuthError, ProcessError, WorkflowError};
pub use gate::{GateView, SessionGate};
pub use processor::{HttpRemoteProcessor, RemoteProcessor, DEFAULT_REQUEST_TIMEOUT};
pub use workflow::{
    Completion, Download, ImageWorkflow, ProcessedImage, SelectedImage, SubmitTicket,
    WorkflowFailure,
};
