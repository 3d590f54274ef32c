//! Attendance Server - ADMS push endpoint with attendance tracking.

pub mod config;
