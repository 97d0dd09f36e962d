pub mod audit;
pub mod auth;
pub mod billing;
pub mod common;
pub mod company;
pub mod customers;
pub mod dashboard;
pub mod health;
pub mod invoices;
pub mod leads;
pub mod line_items;
pub mod me;
pub mod products;
pub mod quotations;
pub mod tasks;
pub mod users;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Root-level probes, outside `/api/v1`.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health::health_check))
}

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public
        .route("/plans", get(auth::list_plans))
        .route("/auth/register-company", post(auth::register_company))
        .route("/auth/register", post(auth::register_user))
        .route("/auth/login", post(auth::login))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/billing/webhooks/stripe", post(billing::stripe_webhook))
        .route("/billing/webhooks/razorpay", post(billing::razorpay_webhook))
        // Session
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/me", get(me::get_me).put(me::update_me))
        .route("/me/password", post(me::change_password))
        // Team
        .route("/users", get(users::list_users).post(users::invite_user))
        .route("/users/:id", get(users::get_user).put(users::update_user))
        .route("/users/:id/deactivate", post(users::deactivate_user))
        .route("/users/:id/activate", post(users::activate_user))
        .route("/users/:id/reset-password", post(users::reset_user_password))
        .route("/company", get(company::get_company).put(company::update_company))
        // Leads
        .route("/leads", get(leads::list_leads).post(leads::create_lead))
        .route(
            "/leads/:id",
            get(leads::get_lead)
                .put(leads::update_lead)
                .delete(leads::delete_lead),
        )
        .route("/leads/:id/status", patch(leads::update_lead_status))
        .route("/leads/:id/assign", post(leads::assign_lead))
        .route("/leads/:id/convert", post(leads::convert_lead))
        .route(
            "/leads/:id/activities",
            get(leads::list_lead_activities).post(leads::add_lead_activity),
        )
        .route("/activities", get(leads::list_activities))
        .route("/pipeline", get(leads::pipeline))
        // Customers and catalogue
        .route(
            "/customers",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route(
            "/customers/:id",
            get(customers::get_customer)
                .put(customers::update_customer)
                .delete(customers::delete_customer),
        )
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        // Quotations
        .route(
            "/quotations",
            get(quotations::list_quotations).post(quotations::create_quotation),
        )
        .route(
            "/quotations/:id",
            get(quotations::get_quotation)
                .put(quotations::update_quotation)
                .delete(quotations::delete_quotation),
        )
        .route("/quotations/:id/send", post(quotations::send_quotation))
        .route("/quotations/:id/convert", post(quotations::convert_quotation))
        .route(
            "/quotations/:id/duplicate",
            post(quotations::duplicate_quotation),
        )
        // Invoices
        .route(
            "/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route(
            "/invoices/:id",
            get(invoices::get_invoice)
                .put(invoices::update_invoice)
                .delete(invoices::delete_invoice),
        )
        .route("/invoices/:id/send", post(invoices::send_invoice))
        .route("/invoices/:id/pay", post(invoices::pay_invoice))
        .route("/invoices/:id/duplicate", post(invoices::duplicate_invoice))
        // Tasks
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/tasks/:id",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/tasks/:id/complete", post(tasks::complete_task))
        // Dashboard
        .route("/dashboard", get(dashboard::dashboard))
        .route("/dashboard/stats", get(dashboard::stats))
        .route("/dashboard/lead-chart", get(dashboard::lead_chart_data))
        .route("/dashboard/revenue-chart", get(dashboard::revenue_chart))
        .route("/search", get(dashboard::search))
        .route("/admin/overview", get(dashboard::admin_overview))
        // Billing
        .route("/billing/subscription", get(billing::get_subscription))
        .route(
            "/billing/subscription/upgrade",
            post(billing::upgrade_subscription),
        )
        .route(
            "/billing/subscription/cancel",
            post(billing::cancel_subscription),
        )
        .route("/billing/usage", get(billing::usage))
        .route("/billing/payments/stripe", post(billing::stripe_payment))
        .route("/billing/payments/razorpay", post(billing::razorpay_payment))
        .route("/audit-logs", get(audit::list_audit_logs))
}
