pub mod models;
pub mod roster_gen;
pub mod shift_clock;
