//! Domain types and DTOs
//!
//! Entity rows, request/response shapes and the pure business rules
//! (pricing, numbering, plans, subdomains) used by the route handlers.

pub mod activities;
pub mod audit;
pub mod billing;
pub mod companies;
pub mod customers;
pub mod dashboard;
pub mod invoices;
pub mod leads;
pub mod line_items;
pub mod numbering;
pub mod plans;
pub mod pricing;
pub mod products;
pub mod quotations;
pub mod tasks;
pub mod users;
