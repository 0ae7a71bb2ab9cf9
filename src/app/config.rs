use crate::adapters::payment::RazorpayCredentials;
use crate::app::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_bind: String,
    pub db_path: String,
    pub command_cache_ttl_secs: u64,
    pub command_cache_capacity: usize,
    pub simulation_tick_ms: u64,
    pub rate_per_kwh: f64,
    pub stop_charging_delay_ms: u64,
    pub razorpay_api_base: String,
    pub razorpay: Option<RazorpayCredentials>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rate_per_kwh = parse_or_default(&lookup, "RATE_PER_KWH", 8.0_f64)?;
        if !rate_per_kwh.is_finite() || rate_per_kwh < 0.0 {
            return Err(AppError::config("RATE_PER_KWH must be a non-negative number"));
        }

        let razorpay = match (
            non_empty(&lookup, "RAZORPAY_KEY_ID"),
            non_empty(&lookup, "RAZORPAY_KEY_SECRET"),
        ) {
            (Some(key_id), Some(key_secret)) => Some(RazorpayCredentials { key_id, key_secret }),
            (None, None) => None,
            _ => {
                return Err(AppError::config(
                    "RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET must be set together",
                ));
            }
        };

        Ok(Self {
            http_bind: non_empty(&lookup, "HTTP_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            db_path: non_empty(&lookup, "DB_PATH")
                .unwrap_or_else(|| "./data/ev_charge.db".to_string()),
            command_cache_ttl_secs: parse_or_default(&lookup, "COMMAND_CACHE_TTL_SECS", 300_u64)?,
            command_cache_capacity: parse_or_default(
                &lookup,
                "COMMAND_CACHE_CAPACITY",
                1024_usize,
            )?,
            simulation_tick_ms: parse_or_default(&lookup, "SIMULATION_TICK_MS", 1000_u64)?,
            rate_per_kwh,
            stop_charging_delay_ms: parse_or_default(&lookup, "STOP_CHARGING_DELAY_MS", 500_u64)?,
            razorpay_api_base: non_empty(&lookup, "RAZORPAY_API_BASE")
                .unwrap_or_else(|| "https://api.razorpay.com/v1".to_string()),
            razorpay,
        })
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}
