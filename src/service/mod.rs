pub mod adjustment;
pub mod audit;
pub mod calculator;
pub mod finalizer;
pub mod payroll;

#[cfg(test)]
pub(crate) mod fixtures;
