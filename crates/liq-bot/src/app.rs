//! Application wiring and lifecycle.
//!
//! Startup order: TLS provider, event bus, rate-limited REST stack,
//! precision registry, position-mode probe, leverage application,
//! balance snapshot, then the long-running tasks (streams, hunter,
//! position manager). Shutdown: cancellation fans out, outstanding
//! CRITICAL requests drain for up to five seconds, and a detached
//! hard-deadline task force-exits if anything hangs.

use crate::config::BotConfig;
use crate::error::{AppError, AppResult};
use dashmap::DashMap;
use liq_core::PositionMode;
use liq_events::{BotEvent, EventBus};
use liq_hunter::{Hunter, MarkPrices};
use liq_position::{PositionEvent, PositionManager};
use liq_registry::PrecisionRegistry;
use liq_rest::{Credentials, ExchangeApi, HttpClient, RateLimiter};
use liq_ws::{
    force_order_url, mark_price_url, MarketEvent, MarketStream, UserDataStream, UserEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Grace period for draining CRITICAL requests on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Hard deadline after which the process force-exits.
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(10);

/// The assembled daemon.
pub struct Application {
    config: BotConfig,
}

impl Application {
    pub fn new(config: BotConfig) -> Self {
        Self { config }
    }

    fn build_rest(
        &self,
        events: &EventBus,
    ) -> AppResult<(RateLimiter, ExchangeApi, CancellationToken)> {
        let credentials = Credentials::new(
            self.config.api.api_key.clone(),
            self.config.api.secret_key.clone(),
        );
        let http = HttpClient::new(self.config.rest_base_url.clone(), credentials)?;
        let limiter = RateLimiter::new(
            self.config.global.rate_limit.clone(),
            Arc::new(http),
            events.clone(),
        );
        let dispatcher_cancel = CancellationToken::new();
        limiter.spawn_dispatcher(dispatcher_cancel.clone());
        let api = ExchangeApi::new(limiter.clone());
        Ok((limiter, api, dispatcher_cancel))
    }

    /// Run the daemon until ctrl-c or a fatal component failure.
    pub async fn run(self) -> AppResult<()> {
        liq_ws::init_crypto();

        let events = EventBus::new(1024);
        let _log_sink = events.spawn_log_sink();

        let (limiter, api, dispatcher_cancel) = self.build_rest(&events)?;
        let paper = self.config.global.paper_mode;

        let registry = Arc::new(PrecisionRegistry::load(&api).await?);

        let mode = self.resolve_position_mode(&api).await;
        info!(?mode, paper, "position mode resolved");

        if !paper {
            self.apply_leverage(&api).await;
            self.publish_balance_snapshot(&api, &events).await;
        }

        let cancel = CancellationToken::new();
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<AppError>(4);

        // --- Market streams -> hunter / mark cache ---
        let (market_tx, mut market_rx) = mpsc::channel::<MarketEvent>(1024);
        let symbol_set = self.config.symbol_set();

        let force_stream = MarketStream::new(
            force_order_url(&self.config.ws_base_url),
            symbol_set.clone(),
            events.clone(),
            market_tx.clone(),
        );
        spawn_stream(force_stream, cancel.child_token(), fatal_tx.clone());

        let mark_stream = MarketStream::new(
            mark_price_url(&self.config.ws_base_url),
            symbol_set,
            events.clone(),
            market_tx,
        );
        spawn_stream(mark_stream, cancel.child_token(), fatal_tx.clone());

        let marks: MarkPrices = Arc::new(DashMap::new());
        let (liq_tx, liq_rx) = mpsc::channel(256);
        {
            let marks = marks.clone();
            let events = events.clone();
            tokio::spawn(async move {
                while let Some(event) = market_rx.recv().await {
                    match event {
                        MarketEvent::Liquidation(liquidation) => {
                            let _ = liq_tx.send(liquidation).await;
                        }
                        MarketEvent::Mark(mark) => {
                            marks.insert(mark.symbol.clone(), mark.mark_price);
                            events.publish(BotEvent::MarkPriceUpdate {
                                symbol: mark.symbol,
                                mark_price: mark.mark_price,
                                timestamp_ms: mark.event_time_ms,
                            });
                        }
                    }
                }
            });
        }

        // --- User-data stream -> position manager + hunter ---
        let (user_tx, mut user_rx) = mpsc::channel::<UserEvent>(256);
        if !paper {
            let stream = UserDataStream::new(
                api.clone(),
                self.config.ws_base_url.clone(),
                events.clone(),
                user_tx.clone(),
            );
            let token = cancel.child_token();
            let fatal = fatal_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = stream.run(token).await {
                    let _ = fatal.send(AppError::Stream(e)).await;
                }
            });
        }
        // Held so the fan-out below survives in paper mode.
        let _user_tx_guard = user_tx;

        let (position_tx, position_rx) = mpsc::channel::<PositionEvent>(256);
        let (entry_update_tx, entry_update_rx) = mpsc::channel(256);
        tokio::spawn(async move {
            while let Some(event) = user_rx.recv().await {
                match event {
                    UserEvent::Account(update) => {
                        let _ = position_tx.send(PositionEvent::Account(update)).await;
                    }
                    UserEvent::Order(update) => {
                        let _ = entry_update_tx.send(update.clone()).await;
                        let _ = position_tx.send(PositionEvent::Order(update)).await;
                    }
                }
            }
        });

        // --- Position manager ---
        let (manager, book) = PositionManager::new(
            api.clone(),
            registry.clone(),
            events.clone(),
            self.config.symbols.clone(),
            &self.config.global,
            mode,
        );
        tokio::spawn(manager.run(position_rx, cancel.child_token()));

        // --- Hunter ---
        let hunter = Hunter::new(
            self.config.symbols.clone(),
            self.config.global.clone(),
            api.clone(),
            registry,
            events.clone(),
            book,
            marks,
            mode,
        );
        tokio::spawn(hunter.run(liq_rx, entry_update_rx, cancel.child_token()));

        info!("daemon running");
        let outcome = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                Ok(())
            }
            Some(err) = fatal_rx.recv() => {
                error!(error = %err, "fatal component failure");
                Err(err)
            }
        };

        // Bounded shutdown: cancel, drain CRITICAL, then stop the
        // dispatcher. The detached deadline prevents hangs.
        let force_exit = tokio::spawn(async {
            tokio::time::sleep(FORCE_EXIT_AFTER).await;
            error!("shutdown deadline exceeded, force exiting");
            std::process::exit(1);
        });
        cancel.cancel();
        limiter.drain_critical(DRAIN_TIMEOUT).await;
        dispatcher_cancel.cancel();
        force_exit.abort();

        info!("shutdown complete");
        outcome
    }

    /// Render account state and exit.
    pub async fn status(self) -> AppResult<()> {
        let events = EventBus::new(64);
        let (_limiter, api, dispatcher_cancel) = self.build_rest(&events)?;

        let dual = api.position_mode().await?;
        let mode = PositionMode::from_dual_side(dual);
        println!("position mode: {:?}", mode);

        let balances = api.balances().await?;
        println!("balances:");
        for balance in balances.iter().filter(|b| !b.balance.is_zero()) {
            println!(
                "  {:<8} balance {:>16} available {:>16}",
                balance.asset, balance.balance, balance.available_balance
            );
        }

        let positions = api.position_risk().await?;
        let open: Vec<_> = positions
            .iter()
            .filter(|p| !p.position_amt.is_zero())
            .collect();
        if open.is_empty() {
            println!("no open positions");
        } else {
            println!("open positions:");
            for position in open {
                println!(
                    "  {:<12} amt {:>12} entry {:>12} mark {:>12} uPnL {:>12}",
                    position.symbol,
                    position.position_amt,
                    position.entry_price,
                    position.mark_price,
                    position.unrealized_profit
                );
            }
        }

        dispatcher_cancel.cancel();
        Ok(())
    }

    /// Startup probe: align the venue's position mode with the
    /// configured one. This is the only writer of the persistent mode.
    async fn resolve_position_mode(&self, api: &ExchangeApi) -> PositionMode {
        let configured = self.config.global.position_mode;
        if self.config.global.paper_mode {
            return configured;
        }
        match api.position_mode().await {
            Ok(dual) => {
                let venue = PositionMode::from_dual_side(dual);
                if venue == configured {
                    return configured;
                }
                match api.set_position_mode(configured.dual_side()).await {
                    Ok(()) => {
                        info!(?configured, "position mode applied to venue");
                        configured
                    }
                    Err(e) => {
                        warn!(error = %e, ?venue, "could not change position mode, adopting venue setting");
                        venue
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "position mode probe failed, using configured mode");
                configured
            }
        }
    }

    async fn apply_leverage(&self, api: &ExchangeApi) {
        for (symbol, config) in &self.config.symbols {
            match api.set_leverage(symbol, config.leverage).await {
                Ok(()) => info!(symbol, leverage = config.leverage, "leverage applied"),
                Err(e) => warn!(symbol, error = %e, "leverage change failed"),
            }
        }
    }

    async fn publish_balance_snapshot(&self, api: &ExchangeApi, events: &EventBus) {
        match api.balances().await {
            Ok(balances) => {
                let now_ms = chrono_now_ms();
                for balance in balances.into_iter().filter(|b| !b.balance.is_zero()) {
                    info!(asset = %balance.asset, balance = %balance.balance, "startup balance");
                    events.publish(BotEvent::BalanceUpdate {
                        asset: balance.asset,
                        wallet_balance: balance.balance,
                        cross_wallet_balance: balance.cross_wallet_balance,
                        balance_change: rust_decimal::Decimal::ZERO,
                        timestamp_ms: now_ms,
                    });
                }
            }
            Err(e) => warn!(error = %e, "startup balance fetch failed"),
        }
    }
}

fn chrono_now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn spawn_stream(
    stream: MarketStream,
    cancel: CancellationToken,
    fatal: mpsc::Sender<AppError>,
) {
    tokio::spawn(async move {
        if let Err(e) = stream.run(cancel).await {
            let _ = fatal.send(AppError::Stream(e)).await;
        }
    });
}
