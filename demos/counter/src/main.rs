//! Counter Demo
//!
//! Two handlers wired through the service container and two mounted
//! components that re-render whenever a handled notification changes them:
//!
//! ```text
//! counter::Request ──▶ Counter (scoped)    ──▶ counter::Changed ──▶ CounterView
//! weather::Request ──▶ Forecaster (async)  ──▶ weather::Fetched ──▶ ForecastView
//! ```
//!
//! # Usage
//!
//! ```bash
//! HERALD_LOGGING__LEVEL=debug cargo run --package counter
//! ```

mod counter;
mod weather;

use std::time::Duration;

use anyhow::Result;
use herald::prelude::*;
use parking_lot::Mutex;
use tracing::info;

// ============================================================================
// Components
// ============================================================================

#[derive(Default)]
struct CounterView {
    current: Mutex<u32>,
}

impl NotificationHandler<counter::Changed> for CounterView {
    fn handle(&self, changed: &counter::Changed) {
        *self.current.lock() = changed.current_count;
    }
}

impl Handler for CounterView {
    fn declare(capabilities: &mut Capabilities<Self>) {
        capabilities.handles::<counter::Changed>();
    }
}

impl Component for CounterView {
    fn state_changed(&self) {
        info!("Current count: {}", self.current.lock());
    }
}

#[derive(Default)]
struct ForecastView {
    forecasts: Mutex<Vec<weather::WeatherForecast>>,
}

impl NotificationHandler<weather::Fetched> for ForecastView {
    fn handle(&self, fetched: &weather::Fetched) {
        *self.forecasts.lock() = fetched.forecasts.clone();
    }
}

impl Handler for ForecastView {
    fn declare(capabilities: &mut Capabilities<Self>) {
        capabilities.handles::<weather::Fetched>();
    }
}

impl Component for ForecastView {
    fn state_changed(&self) {
        for forecast in self.forecasts.lock().iter() {
            info!(
                "Day {:>2}: {:>3} °C / {:>3} °F  {}",
                forecast.day,
                forecast.temperature_c,
                forecast.temperature_f(),
                forecast.summary
            );
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_from_config(&config.logging);

    let provider = ServiceCollection::new()
        .with_settings(config.dispatch)
        .register_scoped_with(|scope| counter::Counter::new(scope.dispatcher().clone()))
        .register_transient_with(|scope| {
            weather::Forecaster::new(scope.dispatcher().clone(), Duration::from_millis(500))
        })
        .build();

    let scope = provider.create_scope();
    let dispatcher = scope.dispatcher();

    let _counter_view = Mounted::mount(dispatcher, Arc::new(CounterView::default()));
    let _forecast_view = Mounted::mount(dispatcher, Arc::new(ForecastView::default()));

    for _ in 0..3 {
        dispatcher.dispatch(counter::Request);
    }

    dispatcher
        .dispatch_and_wait(weather::Request { start_day: 1 })
        .await?;

    info!("Done");
    Ok(())
}
