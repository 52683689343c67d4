pub mod spatial;
pub mod clock;
pub mod error;
pub mod events;
pub mod patterns;
pub mod random;
pub mod road_network;
pub mod vehicles;
pub mod motion;
pub mod congestion;
pub mod slots;
pub mod scenario;
pub mod systems;
pub mod runner;
pub mod telemetry;
pub mod scheduler;
pub mod engine;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
