//! Companies domain module (event-sourced).
//!
//! A company is the tenant boundary: every order, client and invoice belongs
//! to exactly one company. This crate models the company's own lifecycle
//! (active, suspended, cancelled) as pure domain logic.

pub mod company;

pub use company::{
    ActivateCompany, CancelCompany, Company, CompanyActivated, CompanyCancelled, CompanyCommand,
    CompanyEvent, CompanyRegistered, CompanyStatus, CompanySuspended, RegisterCompany,
    SuspendCompany,
};
