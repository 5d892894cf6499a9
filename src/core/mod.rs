pub mod ensemble;

pub use ensemble::{
    BottomTrack, Ensemble, EnsembleSource, Environment, SubsystemId, BAD_VELOCITY,
};
