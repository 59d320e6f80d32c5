pub mod states;
pub mod error;
pub mod params;
pub mod engine;
pub mod potential;
pub mod barnes_hut;
pub mod multipole;
pub mod criterion;
pub mod forces;
pub mod integrator;
pub mod plummer;
pub mod scenario;
