//! Trendline 배치 실행 CLI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use trendline_analytics::EmaEngine;
use trendline_collector::modules;
use trendline_core::{init_logging, AppConfig, EmaPeriod, LogConfig, DEFAULT_CONFIG_PATH};
use trendline_data::{Database, PgSeriesStore};

#[derive(Parser)]
#[command(name = "trendline")]
#[command(about = "Trendline incremental EMA engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 경로
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// 로그 레벨 (설정 파일 값을 덮어씀)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 데이터베이스 마이그레이션 실행
    Migrate,

    /// 지표 전체 재계산
    CalcHistory {
        /// 대상 기간 (생략 시 설정된 모든 기간)
        #[arg(long)]
        period: Option<EmaPeriod>,
    },

    /// 새 일봉의 지표 증분 계산
    Update {
        /// 대상 기간 (생략 시 설정된 모든 기간)
        #[arg(long)]
        period: Option<EmaPeriod>,
    },

    /// 가장 최근 거래일의 교차 종목 출력 (JSON)
    Crossover {
        /// 대상 기간 (생략 시 alert_period)
        #[arg(long)]
        period: Option<EmaPeriod>,
    },

    /// 구간 신호 성과 출력 (JSON)
    Metrics {
        /// 대상 기간 (생략 시 alert_period)
        #[arg(long)]
        period: Option<EmaPeriod>,
        /// 시작일 (YYYYMMDD)
        #[arg(long)]
        start: String,
        /// 종료일 (YYYYMMDD)
        #[arg(long)]
        end: String,
    },

    /// 전체 워크플로우 실행 (기간별 동기화 → 교차 종목 조회)
    RunAll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // 설정 로드
    let config = AppConfig::load(&cli.config).context("설정 로드 실패")?;

    // 로깅 초기화
    let mut log_config = LogConfig::from(&config.logging).with_env_overrides();
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    init_logging(log_config).map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    tracing::info!("Trendline 시작");

    // DB 연결
    let db = Database::connect(&config.database)
        .await
        .context("데이터베이스 연결 실패")?;

    let engine = EmaEngine::new(Arc::new(PgSeriesStore::from_database(&db)));
    let periods = config.engine.periods.clone();
    let alert_period = config.engine.alert_period;

    // 명령 실행
    let outcome = match cli.command {
        Commands::Migrate => db.migrate().await.map_err(anyhow::Error::from),
        Commands::CalcHistory { period } => {
            let targets = period.map(|p| vec![p]).unwrap_or(periods);
            modules::recalc_history(&engine, &targets)
                .await
                .map(|stats| stats.log_summary("전체 재계산"))
                .map_err(anyhow::Error::from)
        }
        Commands::Update { period } => {
            let targets = period.map(|p| vec![p]).unwrap_or(periods);
            let stats = modules::sync_indicators(&engine, &targets).await;
            stats.log_summary("지표 동기화");
            if stats.errors > 0 {
                Err(anyhow::anyhow!("{}개 기간 동기화 실패", stats.errors))
            } else {
                Ok(())
            }
        }
        Commands::Crossover { period } => {
            modules::crossover_report(&engine, period.unwrap_or(alert_period))
                .await
                .map(|json| println!("{}", json))
                .map_err(anyhow::Error::from)
        }
        Commands::Metrics { period, start, end } => {
            let start = modules::parse_trade_date(&start)?;
            let end = modules::parse_trade_date(&end)?;
            modules::metrics_report(&engine, period.unwrap_or(alert_period), start, end)
                .await
                .map(|json| println!("{}", json))
                .map_err(anyhow::Error::from)
        }
        Commands::RunAll => {
            tracing::info!("=== 전체 워크플로우 시작 ===");

            // 1. 기간별 지표 동기화
            tracing::info!("Step 1/2: 지표 동기화");
            let stats = modules::sync_indicators(&engine, &periods).await;
            stats.log_summary("지표 동기화");

            // 2. 교차 종목 조회
            tracing::info!("Step 2/2: 교차 종목 조회");
            let result = modules::crossover_report(&engine, alert_period)
                .await
                .map(|json| println!("{}", json))
                .map_err(anyhow::Error::from);

            tracing::info!("=== 전체 워크플로우 완료 ===");
            match result {
                Ok(()) if stats.errors > 0 => {
                    Err(anyhow::anyhow!("{}개 기간 동기화 실패", stats.errors))
                }
                other => other,
            }
        }
    };

    db.close().await;
    tracing::info!("Trendline 종료");

    outcome
}
