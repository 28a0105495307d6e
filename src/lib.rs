pub mod clock;
pub mod config;
pub mod domain {
    pub mod payment;
    pub mod refund;
}
pub mod error;
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod gateways;
        pub mod ops;
        pub mod payments;
        pub mod webhooks;
    }
    pub mod middleware {
        pub mod admin_auth;
    }
}
pub mod repo {
    pub mod events_repo;
    pub mod gateways_repo;
    pub mod payments_repo;
    pub mod refunds_repo;
    pub mod registrations_repo;
    pub mod tickets_repo;
    pub mod webhook_log_repo;
}
pub mod service {
    pub mod ledger;
    pub mod settlement;
    pub mod webhook_ingest;
}
pub mod settlement {
    pub mod state;
}

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub ledger: service::ledger::PaymentLedger,
    pub engine: service::settlement::SettlementEngine,
    pub webhook_ingest: service::webhook_ingest::WebhookIngest,
    pub payments_repo: repo::payments_repo::PaymentsRepo,
    pub gateways_repo: repo::gateways_repo::GatewaysRepo,
    pub webhook_log_repo: repo::webhook_log_repo::WebhookLogRepo,
}
