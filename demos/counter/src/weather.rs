//! A transient async handler that "fetches" a five-day forecast.

use std::time::Duration;

use herald::prelude::*;
use tracing::info;

const SUMMARIES: [&str; 10] = [
    "Freezing",
    "Bracing",
    "Chilly",
    "Cool",
    "Mild",
    "Warm",
    "Balmy",
    "Hot",
    "Sweltering",
    "Scorching",
];

#[derive(Debug, Clone)]
pub struct WeatherForecast {
    pub day: u32,
    pub temperature_c: i32,
    pub summary: &'static str,
}

impl WeatherForecast {
    pub fn temperature_f(&self) -> i32 {
        32 + (self.temperature_c as f64 / 0.5556) as i32
    }
}

#[derive(Debug, Clone, Notification)]
pub struct Request {
    pub start_day: u32,
}

#[derive(Debug, Clone, Notification)]
pub struct Fetched {
    pub forecasts: Vec<WeatherForecast>,
}

pub struct Forecaster {
    dispatcher: Dispatcher,
    latency: Duration,
}

impl Forecaster {
    pub fn new(dispatcher: Dispatcher, latency: Duration) -> Self {
        Self {
            dispatcher,
            latency,
        }
    }
}

#[async_trait]
impl AsyncNotificationHandler<Request> for Forecaster {
    async fn handle_async(&self, request: Arc<Request>) {
        info!(start_day = request.start_day, "Fetching forecast");
        tokio::time::sleep(self.latency).await;

        // Deterministic stand-in for a remote service.
        let forecasts = (1..=5)
            .map(|offset| {
                let day = request.start_day + offset;
                WeatherForecast {
                    day,
                    temperature_c: (day as i32 * 17) % 75 - 20,
                    summary: SUMMARIES[(day as usize * 7) % SUMMARIES.len()],
                }
            })
            .collect();

        self.dispatcher.dispatch(Fetched { forecasts });
    }
}

impl Handler for Forecaster {
    fn declare(capabilities: &mut Capabilities<Self>) {
        capabilities.handles_async::<Request>();
    }
}
