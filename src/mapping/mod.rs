//! Modul für die Umwandlung von Eingabe-Ereignissen in Ausgabe-Aktionen.
//!
//! Bindings verknüpfen einen physischen Eingang mit genau einer Aktion (Vest-Effekt,
//! virtueller Button, virtuelle Achse, Stuhl-Kommando, Puls-Sequenz, Rumble).
//! Die Engine läuft als Statum State Machine in einem eigenen tokio Task und
//! tickt mit fester Frequenz.

pub mod binding;
pub mod dispatcher;
pub mod document;
pub mod engine;
pub mod error;
pub mod sequence;
pub mod state;

// Re-exports für einfacheren Zugriff
pub use binding::{Action, Binding, BindingTable};
pub use dispatcher::{DispatchStats, Dispatcher, Outputs};
pub use document::BindingDocument;
pub use engine::{BridgeEngine, EngineDevices, EngineHandle};
pub use error::{BindingError, EngineError};
pub use state::{EngineState, InstanceKey};
