use crate::gateways::GatewayProfile;
use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct GatewayRow {
    pub name: String,
    pub slug: String,
    pub adapter_type: String,
    pub is_active: bool,
    pub credentials: serde_json::Value,
    pub settings: serde_json::Value,
    pub supports_webhooks: bool,
    pub webhook_secret: Option<String>,
    pub supported_currencies: Vec<String>,
}

impl GatewayRow {
    pub fn supports_currency(&self, currency: &str) -> bool {
        self.supported_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(currency))
    }

    pub fn profile(&self) -> GatewayProfile {
        GatewayProfile {
            slug: self.slug.clone(),
            name: self.name.clone(),
            adapter_type: self.adapter_type.clone(),
            credentials: self.credentials.clone(),
            settings: self.settings.clone(),
            webhook_secret: self.webhook_secret.clone(),
            supported_currencies: self.supported_currencies.clone(),
        }
    }

    pub fn platform_fee_bps(&self) -> i64 {
        self.settings
            .get("platform_fee_bps")
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }
}

const GATEWAY_COLUMNS: &str = "name, slug, adapter_type, is_active, credentials, settings, \
     supports_webhooks, webhook_secret, supported_currencies";

fn map_gateway(r: &PgRow) -> GatewayRow {
    GatewayRow {
        name: r.get("name"),
        slug: r.get("slug"),
        adapter_type: r.get("adapter_type"),
        is_active: r.get("is_active"),
        credentials: r.get("credentials"),
        settings: r.get("settings"),
        supports_webhooks: r.get("supports_webhooks"),
        webhook_secret: r.get("webhook_secret"),
        supported_currencies: r.get("supported_currencies"),
    }
}

#[derive(Clone)]
pub struct GatewaysRepo {
    pub pool: PgPool,
}

impl GatewaysRepo {
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<GatewayRow>> {
        let row = sqlx::query(&format!(
            "SELECT {GATEWAY_COLUMNS} FROM payment_gateways WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| map_gateway(&r)))
    }

    pub async fn list_active(&self) -> Result<Vec<GatewayRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {GATEWAY_COLUMNS} FROM payment_gateways WHERE is_active = true ORDER BY slug"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_gateway).collect())
    }

    pub async fn list_all(&self) -> Result<Vec<GatewayRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {GATEWAY_COLUMNS} FROM payment_gateways ORDER BY slug"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_gateway).collect())
    }
}
