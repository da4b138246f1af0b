mod bands;
mod engine;
mod error;
mod ground_station;
mod predictor;
mod process_engine;
mod propagation;
mod sgp4_engine;
mod tle;
mod types;

pub use bands::Band;
pub use engine::GeometryEngine;
pub use error::PredictError;
pub use ground_station::GroundStation;
pub use predictor::PassPredictor;
pub use process_engine::ProcessEngine;
pub use sgp4_engine::Sgp4Engine;
pub use tle::OrbitModel;
pub use types::Prediction;

#[cfg(test)]
pub(crate) use predictor::testing;
#[cfg(test)]
pub(crate) use types::CompatibleMode;
#[cfg(test)]
pub(crate) use tle::fixtures;
