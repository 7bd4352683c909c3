//! PostgreSQL 저장소 구현.
//!
//! `daily_prices` 테이블에 일봉을 저장하고, 기간별 `ema_{p}` / `score_ema_{p}`
//! 컬럼을 채웁니다. 쓰기 트랜잭션은 기간별 advisory lock으로 직렬화됩니다.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info, instrument};
use trendline_core::{Bar, DatabaseConfig, EmaPeriod, IndicatorBar, IndicatorRow};

use super::{MergeSession, SchemaCapabilities, SeriesStore};
use crate::error::{DataError, Result};

/// 일봉 테이블 이름.
pub const PRICES_TABLE: &str = "daily_prices";

const BAR_COLUMNS: &str = "ts_code, trade_date, open, close, low, high, vol, amount";

/// 한 번에 UNNEST로 보내는 행 수.
const CHUNK_SIZE: usize = 500;

/// advisory lock 키 상위 32비트 ("EMA").
const LOCK_NAMESPACE: i64 = 0x0045_4D41;

/// 데이터베이스 연결 풀 래퍼.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 새로운 데이터베이스 연결 풀을 생성합니다.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DataError::StoreUnavailable(e.to_string()))?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// 기존 연결 풀에서 Database 인스턴스를 생성합니다.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 내부 연결 풀을 반환합니다.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 데이터베이스 마이그레이션을 실행합니다.
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations...");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully");
        Ok(())
    }

    /// 연결을 닫습니다.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// 일봉 레코드.
#[derive(Debug, Clone, FromRow)]
pub struct BarRecord {
    pub ts_code: String,
    pub trade_date: NaiveDate,
    pub open: Decimal,
    pub close: Decimal,
    pub low: Decimal,
    pub high: Decimal,
    pub vol: Option<Decimal>,
    pub amount: Option<Decimal>,
}

impl From<BarRecord> for Bar {
    fn from(record: BarRecord) -> Self {
        Bar {
            instrument_id: record.ts_code,
            trade_date: record.trade_date,
            open: record.open,
            close: record.close,
            low: record.low,
            high: record.high,
            volume: record.vol,
            amount: record.amount,
        }
    }
}

/// 한 기간의 지표 컬럼이 포함된 일봉 레코드.
#[derive(Debug, Clone, FromRow)]
pub struct IndicatorBarRecord {
    #[sqlx(flatten)]
    pub bar: BarRecord,
    pub ema: Option<Decimal>,
    pub trend: Option<bool>,
}

impl From<IndicatorBarRecord> for IndicatorBar {
    fn from(record: IndicatorBarRecord) -> Self {
        IndicatorBar::new(record.bar.into(), record.ema, record.trend)
    }
}

/// 기간의 지표/신호 컬럼을 `ema`, `trend` 별칭으로 조회하는 SELECT 절.
fn indicator_select(period: EmaPeriod) -> String {
    format!(
        "SELECT {}, {} AS ema, {} AS trend FROM {}",
        BAR_COLUMNS,
        period.column_name(),
        period.signal_column_name(),
        PRICES_TABLE
    )
}

/// 기간별 advisory lock 키.
fn period_lock_key(period: EmaPeriod) -> i64 {
    (LOCK_NAMESPACE << 32) | i64::from(period.get())
}

/// 스테이징 행을 기본 테이블에 복사하는 UPDATE 문.
fn merge_update_sql(period: EmaPeriod) -> String {
    format!(
        r#"
        UPDATE {table} AS d
        SET {ema} = s.ema, {score} = s.trend
        FROM indicator_staging AS s
        WHERE d.ts_code = s.ts_code AND d.trade_date = s.trade_date
        "#,
        table = PRICES_TABLE,
        ema = period.column_name(),
        score = period.signal_column_name(),
    )
}

async fn lock_period(tx: &mut Transaction<'static, Postgres>, period: EmaPeriod) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(period_lock_key(period))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// PostgreSQL 기반 [`SeriesStore`].
#[derive(Clone)]
pub struct PgSeriesStore {
    pool: PgPool,
}

impl PgSeriesStore {
    /// 연결 풀로 저장소를 생성합니다.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Database 래퍼에서 저장소를 생성합니다.
    pub fn from_database(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }

    async fn fetch_indicator_bars(
        &self,
        sql: &str,
        binds: IndicatorQuery<'_>,
    ) -> Result<Vec<IndicatorBar>> {
        let query = sqlx::query_as::<_, IndicatorBarRecord>(sql);
        let query = match binds {
            IndicatorQuery::OnDate(date) => query.bind(date),
            IndicatorQuery::Instrument(id, start, end) => query.bind(id).bind(start).bind(end),
            IndicatorQuery::Between(start, end) => query.bind(start).bind(end),
        };
        let records = query.fetch_all(&self.pool).await?;
        Ok(records.into_iter().map(Into::into).collect())
    }
}

enum IndicatorQuery<'a> {
    OnDate(NaiveDate),
    Instrument(&'a str, NaiveDate, NaiveDate),
    Between(NaiveDate, NaiveDate),
}

#[async_trait]
impl SeriesStore for PgSeriesStore {
    #[instrument(skip_all, fields(period = %period))]
    async fn ensure_indicator_columns(&self, period: EmaPeriod) -> Result<SchemaCapabilities> {
        let ema_column = period.column_name();
        let signal_column = period.signal_column_name();
        let has_indicator = self.has_column(&ema_column).await?;
        let has_signal = self.has_column(&signal_column).await?;

        if has_indicator && has_signal {
            return Ok(SchemaCapabilities {
                has_indicator,
                has_signal,
                created: false,
            });
        }

        let mut tx = self.pool.begin().await?;
        lock_period(&mut tx, period).await?;
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} NUMERIC(10, 2)",
            PRICES_TABLE, ema_column
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} BOOLEAN",
            PRICES_TABLE, signal_column
        ))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(column = %ema_column, "지표 컬럼 추가 완료");

        Ok(SchemaCapabilities {
            has_indicator: true,
            has_signal: true,
            created: true,
        })
    }

    async fn has_column(&self, name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = current_schema()
                  AND table_name = $1
                  AND column_name = $2
            )
            "#,
        )
        .bind(PRICES_TABLE)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    #[instrument(skip_all)]
    async fn get_full_history(&self) -> Result<Vec<Bar>> {
        let records: Vec<BarRecord> = sqlx::query_as(&format!(
            "SELECT {} FROM {} ORDER BY trade_date, ts_code",
            BAR_COLUMNS, PRICES_TABLE
        ))
        .fetch_all(&self.pool)
        .await?;

        debug!(count = records.len(), "전체 일봉 조회");
        Ok(records.into_iter().map(Into::into).collect())
    }

    #[instrument(skip_all, fields(period = %period))]
    async fn get_rows_missing(&self, period: EmaPeriod) -> Result<Vec<Bar>> {
        let records: Vec<BarRecord> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE {} IS NULL ORDER BY trade_date, ts_code",
            BAR_COLUMNS,
            PRICES_TABLE,
            period.column_name()
        ))
        .fetch_all(&self.pool)
        .await?;

        debug!(count = records.len(), "지표 미계산 일봉 조회");
        Ok(records.into_iter().map(Into::into).collect())
    }

    async fn get_seed(
        &self,
        period: EmaPeriod,
        instrument_id: &str,
        before: NaiveDate,
    ) -> Result<Option<IndicatorBar>> {
        let sql = format!(
            "{} WHERE ts_code = $1 AND trade_date < $2 AND {} IS NOT NULL \
             ORDER BY trade_date DESC LIMIT 1",
            indicator_select(period),
            period.column_name()
        );
        let record: Option<IndicatorBarRecord> = sqlx::query_as(&sql)
            .bind(instrument_id)
            .bind(before)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record.map(Into::into))
    }

    async fn get_bars_on(&self, period: EmaPeriod, date: NaiveDate) -> Result<Vec<IndicatorBar>> {
        let sql = format!(
            "{} WHERE trade_date = $1 ORDER BY ts_code",
            indicator_select(period)
        );
        self.fetch_indicator_bars(&sql, IndicatorQuery::OnDate(date))
            .await
    }

    async fn get_range(
        &self,
        period: EmaPeriod,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorBar>> {
        let sql = format!(
            "{} WHERE ts_code = $1 AND trade_date BETWEEN $2 AND $3 ORDER BY trade_date",
            indicator_select(period)
        );
        self.fetch_indicator_bars(&sql, IndicatorQuery::Instrument(instrument_id, start, end))
            .await
    }

    async fn get_between(
        &self,
        period: EmaPeriod,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorBar>> {
        let sql = format!(
            "{} WHERE trade_date BETWEEN $1 AND $2 ORDER BY trade_date, ts_code",
            indicator_select(period)
        );
        self.fetch_indicator_bars(&sql, IndicatorQuery::Between(start, end))
            .await
    }

    async fn latest_trade_date(&self) -> Result<Option<NaiveDate>> {
        let latest: Option<NaiveDate> =
            sqlx::query_scalar(&format!("SELECT MAX(trade_date) FROM {}", PRICES_TABLE))
                .fetch_one(&self.pool)
                .await?;
        Ok(latest)
    }

    #[instrument(skip_all, fields(count = bars.len()))]
    async fn insert_bars(&self, bars: &[Bar]) -> Result<u64> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for chunk in bars.chunks(CHUNK_SIZE) {
            let codes: Vec<&str> = chunk.iter().map(|b| b.instrument_id.as_str()).collect();
            let dates: Vec<NaiveDate> = chunk.iter().map(|b| b.trade_date).collect();
            let opens: Vec<Decimal> = chunk.iter().map(|b| b.open).collect();
            let closes: Vec<Decimal> = chunk.iter().map(|b| b.close).collect();
            let lows: Vec<Decimal> = chunk.iter().map(|b| b.low).collect();
            let highs: Vec<Decimal> = chunk.iter().map(|b| b.high).collect();
            let vols: Vec<Option<Decimal>> = chunk.iter().map(|b| b.volume).collect();
            let amounts: Vec<Option<Decimal>> = chunk.iter().map(|b| b.amount).collect();

            // ON CONFLICT 없음: 중복 키는 23505로 실패하고 전체 롤백
            let result = sqlx::query(&format!(
                r#"
                INSERT INTO {} ({})
                SELECT * FROM UNNEST(
                    $1::varchar[], $2::date[],
                    $3::numeric[], $4::numeric[], $5::numeric[], $6::numeric[],
                    $7::numeric[], $8::numeric[]
                )
                "#,
                PRICES_TABLE, BAR_COLUMNS
            ))
            .bind(&codes)
            .bind(&dates)
            .bind(&opens)
            .bind(&closes)
            .bind(&lows)
            .bind(&highs)
            .bind(&vols)
            .bind(&amounts)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        info!(inserted = inserted, "일봉 저장 완료");
        Ok(inserted)
    }

    #[instrument(skip_all, fields(period = %period, rows = rows.len()))]
    async fn replace_indicator(&self, period: EmaPeriod, rows: &[IndicatorRow]) -> Result<u64> {
        let ema_column = period.column_name();
        let signal_column = period.signal_column_name();

        let mut tx = self.pool.begin().await?;
        lock_period(&mut tx, period).await?;

        sqlx::query(&format!(
            "UPDATE {table} SET {ema} = NULL, {score} = NULL \
             WHERE {ema} IS NOT NULL OR {score} IS NOT NULL",
            table = PRICES_TABLE,
            ema = ema_column,
            score = signal_column
        ))
        .execute(&mut *tx)
        .await?;

        let update_sql = format!(
            r#"
            UPDATE {table} AS d
            SET {ema} = u.ema, {score} = u.trend
            FROM UNNEST($1::varchar[], $2::date[], $3::numeric[], $4::bool[])
                AS u(ts_code, trade_date, ema, trend)
            WHERE d.ts_code = u.ts_code AND d.trade_date = u.trade_date
            "#,
            table = PRICES_TABLE,
            ema = ema_column,
            score = signal_column
        );

        let mut updated = 0;
        for chunk in rows.chunks(CHUNK_SIZE) {
            let codes: Vec<&str> = chunk.iter().map(|r| r.instrument_id.as_str()).collect();
            let dates: Vec<NaiveDate> = chunk.iter().map(|r| r.trade_date).collect();
            let emas: Vec<Decimal> = chunk.iter().map(|r| r.ema).collect();
            let trends: Vec<Option<bool>> = chunk.iter().map(|r| r.trend).collect();

            let result = sqlx::query(&update_sql)
                .bind(&codes)
                .bind(&dates)
                .bind(&emas)
                .bind(&trends)
                .execute(&mut *tx)
                .await?;

            if (result.rows_affected() as usize) < chunk.len() {
                let (instrument_id, trade_date): (String, NaiveDate) = sqlx::query_as(&format!(
                    r#"
                    SELECT u.ts_code, u.trade_date
                    FROM UNNEST($1::varchar[], $2::date[]) AS u(ts_code, trade_date)
                    LEFT JOIN {} AS d
                        ON d.ts_code = u.ts_code AND d.trade_date = u.trade_date
                    WHERE d.ts_code IS NULL
                    LIMIT 1
                    "#,
                    PRICES_TABLE
                ))
                .bind(&codes)
                .bind(&dates)
                .fetch_one(&mut *tx)
                .await?;
                // tx는 drop 시 롤백
                return Err(DataError::KeyMismatch {
                    instrument_id,
                    trade_date,
                });
            }
            updated += result.rows_affected();
        }

        tx.commit().await?;
        info!(updated = updated, "지표 전체 교체 완료");
        Ok(updated)
    }

    async fn begin_merge(&self, period: EmaPeriod) -> Result<Box<dyn MergeSession>> {
        let mut tx = self.pool.begin().await?;
        lock_period(&mut tx, period).await?;

        sqlx::query(
            r#"
            CREATE TEMP TABLE indicator_staging (
                ts_code VARCHAR(16) NOT NULL,
                trade_date DATE NOT NULL,
                ema NUMERIC(10, 2) NOT NULL,
                trend BOOLEAN,
                PRIMARY KEY (ts_code, trade_date)
            ) ON COMMIT DROP
            "#,
        )
        .execute(&mut *tx)
        .await?;

        Ok(Box::new(PgMergeSession { tx, period }))
    }
}

/// PostgreSQL 병합 세션.
///
/// 스테이징 테이블은 세션 트랜잭션 안에서 생성되므로 commit/rollback 시 함께 제거됩니다.
pub struct PgMergeSession {
    tx: Transaction<'static, Postgres>,
    period: EmaPeriod,
}

#[async_trait]
impl MergeSession for PgMergeSession {
    async fn stage(&mut self, rows: &[IndicatorRow]) -> Result<usize> {
        let mut staged = 0;
        for chunk in rows.chunks(CHUNK_SIZE) {
            let codes: Vec<&str> = chunk.iter().map(|r| r.instrument_id.as_str()).collect();
            let dates: Vec<NaiveDate> = chunk.iter().map(|r| r.trade_date).collect();
            let emas: Vec<Decimal> = chunk.iter().map(|r| r.ema).collect();
            let trends: Vec<Option<bool>> = chunk.iter().map(|r| r.trend).collect();

            let result = sqlx::query(
                r#"
                INSERT INTO indicator_staging (ts_code, trade_date, ema, trend)
                SELECT * FROM UNNEST($1::varchar[], $2::date[], $3::numeric[], $4::bool[])
                "#,
            )
            .bind(&codes)
            .bind(&dates)
            .bind(&emas)
            .bind(&trends)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| match DataError::from(e) {
                DataError::DuplicateBar(msg) => {
                    DataError::InvalidData(format!("duplicate staging key: {}", msg))
                }
                other => other,
            })?;

            staged += result.rows_affected() as usize;
        }

        debug!(period = %self.period, staged = staged, "스테이징 기록");
        Ok(staged)
    }

    async fn find_unmatched(&mut self) -> Result<Option<(String, NaiveDate)>> {
        let unmatched: Option<(String, NaiveDate)> = sqlx::query_as(&format!(
            r#"
            SELECT s.ts_code, s.trade_date
            FROM indicator_staging AS s
            LEFT JOIN {} AS d
                ON d.ts_code = s.ts_code AND d.trade_date = s.trade_date
            WHERE d.ts_code IS NULL
            ORDER BY s.trade_date, s.ts_code
            LIMIT 1
            "#,
            PRICES_TABLE
        ))
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(unmatched)
    }

    async fn apply(&mut self) -> Result<u64> {
        let result = sqlx::query(&merge_update_sql(self.period))
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn discard(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
