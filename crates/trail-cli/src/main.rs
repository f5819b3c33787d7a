//! 트레일링 스탑 실행 엔진 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 엔진 구동 (symbols.toml의 모든 심볼, Ctrl+C로 종료)
//! trail run
//!
//! # 거래소 포지션 확인
//! trail positions
//!
//! # 심볼별 기록과 차단 상태 요약
//! trail status
//!
//! # 모든 포지션 시장가 청산 + 미체결 주문 취소
//! trail close-all
//! ```

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trail_engine::{close_all, load_symbol_configs, symbol_status, Engine, EngineConfig};
use trail_exchange::{BinanceFuturesClient, BinanceFuturesConfig, FuturesApi};
use trail_notification::{NotificationSender, TelegramSender};
use trail_store::{JsonFileStore, StateStore};

#[derive(Parser)]
#[command(name = "trail")]
#[command(about = "바이낸스 USDT-M 선물 트레일링 스탑 실행 엔진", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// 실행 엔진 구동 (Ctrl+C로 현재 봉까지 처리 후 종료)
    Run,

    /// 거래소의 열린 포지션 조회
    Positions,

    /// 심볼별 로컬 기록과 진입 차단 상태 요약
    Status,

    /// 모든 포지션 시장가 청산 및 미체결 주문 취소
    CloseAll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (없어도 에러 안남)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // 로깅 초기화 (실행 파이프라인 크레이트 전부 포함)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "trail_engine={},trail_exchange={},trail_risk={}",
                    cli.log_level, cli.log_level, cli.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();
    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(config.state_path.clone()));

    match cli.command {
        Commands::Run => run(config, store).await?,
        Commands::Positions => positions().await?,
        Commands::Status => status(config, store).await?,
        Commands::CloseAll => close_all_positions(store).await?,
    }

    Ok(())
}

/// API 키로 거래소 클라이언트를 만듭니다.
fn connect() -> anyhow::Result<Arc<dyn FuturesApi>> {
    let config = BinanceFuturesConfig::from_env()?;
    let client = BinanceFuturesClient::new(config)?;
    Ok(Arc::new(client))
}

fn alert_sender() -> Option<Arc<dyn NotificationSender>> {
    match TelegramSender::from_env() {
        Some(sender) => {
            info!("Telegram 알림 활성화");
            let sender: Arc<dyn NotificationSender> = Arc::new(sender);
            Some(sender)
        }
        None => {
            info!("Telegram 알림 비활성화 (TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID 미설정)");
            None
        }
    }
}

async fn run(config: EngineConfig, store: Arc<dyn StateStore>) -> anyhow::Result<()> {
    let symbols = load_symbol_configs(&config.symbols_path)?;
    let api = connect()?;
    let alerts = alert_sender();

    info!(symbols = symbols.len(), "트레일링 스탑 엔진 시작");
    let engine = Engine::new(config, symbols, api, store, alerts);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("종료 신호 수신, 현재 봉까지 처리 후 종료");
        shutdown.cancel();
    });

    engine.run(cancel).await;
    Ok(())
}

async fn positions() -> anyhow::Result<()> {
    let api = connect()?;
    let positions = api.fetch_positions(None).await?;
    let open: Vec<_> = positions.iter().filter(|p| p.is_open()).collect();

    if open.is_empty() {
        println!("열린 포지션이 없습니다.");
        return Ok(());
    }

    println!("\n📊 거래소 포지션:");
    println!("{:-<76}", "");
    for p in open {
        let side = p
            .side()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<12} | {:<5} | 수량 {:>12} | 진입가 {:>12} | 미실현 {:>10}",
            p.symbol,
            side,
            p.position_amt.to_string(),
            p.entry_price.to_string(),
            p.unrealized_pnl.to_string()
        );
    }
    println!("{:-<76}", "");
    Ok(())
}

async fn status(config: EngineConfig, store: Arc<dyn StateStore>) -> anyhow::Result<()> {
    let symbols = load_symbol_configs(&config.symbols_path)?;

    println!("\n📋 심볼 상태:");
    println!("{:-<76}", "");
    for symbol_config in &symbols {
        let status = symbol_status(
            &symbol_config.symbol,
            symbol_config.risk.clone(),
            Arc::clone(&store),
        )
        .await?;

        let position = match &status.position {
            Some(p) => format!(
                "{} {} @ {} (손절 {})",
                p.side, p.qty, p.entry_price, p.current_sl
            ),
            None => "없음".to_string(),
        };
        println!("  {:<12} | 포지션: {}", status.symbol, position);
        println!(
            "  {:<12} | 거래 {}건, 누적 수익률 {}%",
            "", status.trades, status.total_pnl_pct
        );
        if status.block.blocked {
            let remaining = status
                .block
                .cooldown_remaining
                .map(|minutes| format!(" ({:.0}분 남음)", minutes))
                .unwrap_or_default();
            println!(
                "  {:<12} | ⚠️  진입 차단: {}{}",
                "", status.block.reason, remaining
            );
        }
    }
    println!("{:-<76}", "");
    Ok(())
}

async fn close_all_positions(store: Arc<dyn StateStore>) -> anyhow::Result<()> {
    let api = connect()?;

    println!("\n모든 포지션을 시장가로 청산합니다...");
    let records = close_all(api, store).await?;

    if records.is_empty() {
        println!("청산할 로컬 포지션 기록이 없습니다.");
        return Ok(());
    }

    println!("\n✅ 청산 완료: {}건", records.len());
    for record in &records {
        println!(
            "  {:<12} | {} | 진입 {} → 청산 {} | 수익률 {}%",
            record.symbol,
            record.side,
            record.entry_price,
            record.exit_price,
            record.pnl_pct
        );
    }
    Ok(())
}
