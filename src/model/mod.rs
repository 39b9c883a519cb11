pub mod audit_log;
pub mod attendance;
pub mod payroll_cycle;
pub mod payroll_detail;
pub mod role;
