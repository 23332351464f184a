//! Person detection capability.
//!
//! - `DetectorBackend`: the detector seam (cpu, scripted, tract/ONNX)
//! - `detect_persons`: class + confidence filtering
//! - `SelectionPolicy`: picks the tracked subject among several persons

mod backend;
pub mod backends;
mod person;
mod result;
mod select;

pub use backend::DetectorBackend;
pub use backends::{open_backend, CpuBackend, ScriptedBackend};
pub use person::detect_persons;
pub use result::{Detection, ObjectClass, COCO_PERSON};
pub use select::SelectionPolicy;
