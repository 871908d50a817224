//! Population management and genetic operators for paramrace.
//!
//! The population is split into a competitive pool, which enters the
//! tournaments, and a non-competitive pool that only contributes alleles
//! as crossover mates. Winners survive, losers' slots are refilled by
//! offspring, and genomes retire once they exceed the age cap.

pub mod operators;
pub mod population;

pub use operators::GeneticOperators;
pub use population::Population;
