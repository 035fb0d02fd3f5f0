use crate::error::StrategyError;
use configuration::IndicatorParams;
use core_types::Kline;
use rust_decimal::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use ta::indicators::{
    AverageTrueRange as Atr, BollingerBands, ExponentialMovingAverage as Ema,
    RelativeStrengthIndex as Rsi, SimpleMovingAverage as Sma,
};
use ta::{DataItem, Next};

/// The named values an `IndicatorEngine` can produce for the most recent bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Indicator {
    Rsi,
    Atr,
    Adx,
    BbUpper,
    BbMiddle,
    BbLower,
    EmaFast,
    EmaSlow,
    Sma,
    /// Mean volume of the bars preceding the latest one.
    VolumeAvg,
    Volume,
    Support,
    Resistance,
    LastOpen,
    LastHigh,
    LastLow,
    LastClose,
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Indicator::Rsi => "RSI",
            Indicator::Atr => "ATR",
            Indicator::Adx => "ADX",
            Indicator::BbUpper => "BB_upper",
            Indicator::BbMiddle => "BB_middle",
            Indicator::BbLower => "BB_lower",
            Indicator::EmaFast => "EMA_fast",
            Indicator::EmaSlow => "EMA_slow",
            Indicator::Sma => "SMA",
            Indicator::VolumeAvg => "volume_avg",
            Indicator::Volume => "volume",
            Indicator::Support => "support",
            Indicator::Resistance => "resistance",
            Indicator::LastOpen => "open",
            Indicator::LastHigh => "high",
            Indicator::LastLow => "low",
            Indicator::LastClose => "close",
        };
        f.write_str(name)
    }
}

/// Indicator values for the latest bar of a history.
///
/// An indicator whose lookback exceeds the available history, or whose value
/// is not finite, is simply absent. Policies must treat absence as "no signal".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet {
    values: BTreeMap<Indicator, f64>,
}

impl IndicatorSet {
    pub fn get(&self, indicator: Indicator) -> Option<f64> {
        self.values.get(&indicator).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Indicator, f64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    /// Inserts a value, silently dropping NaN and infinities.
    pub fn insert(&mut self, indicator: Indicator, value: f64) {
        if value.is_finite() {
            self.values.insert(indicator, value);
        }
    }
}

/// Computes the full indicator set from a bar history ordered oldest to newest.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Result<Self, StrategyError> {
        let periods = [
            ("rsi_period", params.rsi_period),
            ("atr_period", params.atr_period),
            ("adx_period", params.adx_period),
            ("bb_period", params.bb_period),
            ("ema_fast_period", params.ema_fast_period),
            ("ema_slow_period", params.ema_slow_period),
            ("sma_period", params.sma_period),
            ("volume_lookback", params.volume_lookback),
            ("swing_lookback", params.swing_lookback),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, p)| *p == 0) {
            return Err(StrategyError::InvalidParameters(format!("{} must be at least 1", name)));
        }
        if params.ema_fast_period >= params.ema_slow_period {
            return Err(StrategyError::InvalidParameters(
                "Fast EMA period must be less than slow EMA period".to_string(),
            ));
        }
        if !(params.bb_std_dev.is_finite() && params.bb_std_dev > 0.0) {
            return Err(StrategyError::InvalidParameters(
                "bb_std_dev must be a positive number".to_string(),
            ));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    /// The longest lookback any indicator needs, i.e. the history length at
    /// which every indicator is present.
    pub fn warmup_bars(&self) -> usize {
        let p = &self.params;
        [
            p.rsi_period + 1,
            p.atr_period + 1,
            2 * p.adx_period,
            p.bb_period,
            p.ema_slow_period,
            p.sma_period,
            p.volume_lookback + 1,
            p.swing_lookback,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }

    pub fn compute(&self, bars: &[Kline]) -> IndicatorSet {
        let mut set = IndicatorSet::default();
        let series = match Series::from_bars(bars) {
            Some(series) if !series.close.is_empty() => series,
            _ => return set,
        };
        let p = &self.params;
        let n = series.close.len();
        let last = n - 1;

        set.insert(Indicator::LastOpen, series.open[last]);
        set.insert(Indicator::LastHigh, series.high[last]);
        set.insert(Indicator::LastLow, series.low[last]);
        set.insert(Indicator::LastClose, series.close[last]);
        set.insert(Indicator::Volume, series.volume[last]);

        if n > p.rsi_period {
            if let Ok(mut rsi) = Rsi::new(p.rsi_period) {
                if let Some(v) = series.close.iter().map(|c| rsi.next(*c)).last() {
                    set.insert(Indicator::Rsi, v);
                }
            }
        }

        if n >= p.ema_slow_period {
            if let (Ok(mut fast), Ok(mut slow)) = (Ema::new(p.ema_fast_period), Ema::new(p.ema_slow_period)) {
                let (mut f, mut s) = (f64::NAN, f64::NAN);
                for c in &series.close {
                    f = fast.next(*c);
                    s = slow.next(*c);
                }
                set.insert(Indicator::EmaFast, f);
                set.insert(Indicator::EmaSlow, s);
            }
        }

        if n >= p.sma_period {
            if let Ok(mut sma) = Sma::new(p.sma_period) {
                if let Some(v) = series.close.iter().map(|c| sma.next(*c)).last() {
                    set.insert(Indicator::Sma, v);
                }
            }
        }

        if n >= p.bb_period {
            if let Ok(mut bb) = BollingerBands::new(p.bb_period, p.bb_std_dev) {
                if let Some(out) = series.close.iter().map(|c| bb.next(*c)).last() {
                    set.insert(Indicator::BbUpper, out.upper);
                    set.insert(Indicator::BbMiddle, out.average);
                    set.insert(Indicator::BbLower, out.lower);
                }
            }
        }

        if n > p.atr_period {
            if let Some(v) = atr(&series, p.atr_period) {
                set.insert(Indicator::Atr, v);
            }
        }

        if let Some(v) = wilder_adx(&series.high, &series.low, &series.close, p.adx_period) {
            set.insert(Indicator::Adx, v);
        }

        if n > p.volume_lookback {
            let window = &series.volume[n - 1 - p.volume_lookback..last];
            set.insert(Indicator::VolumeAvg, window.iter().sum::<f64>() / window.len() as f64);
        }

        if n >= p.swing_lookback {
            let start = n - p.swing_lookback;
            let support = series.low[start..].iter().copied().fold(f64::INFINITY, f64::min);
            let resistance = series.high[start..].iter().copied().fold(f64::NEG_INFINITY, f64::max);
            set.insert(Indicator::Support, support);
            set.insert(Indicator::Resistance, resistance);
        }

        set
    }
}

/// Column-oriented f64 view of a bar history.
struct Series {
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
}

impl Series {
    fn from_bars(bars: &[Kline]) -> Option<Self> {
        let mut series = Series {
            open: Vec::with_capacity(bars.len()),
            high: Vec::with_capacity(bars.len()),
            low: Vec::with_capacity(bars.len()),
            close: Vec::with_capacity(bars.len()),
            volume: Vec::with_capacity(bars.len()),
        };
        // The `ta` crate works in f64; a Decimal that cannot convert makes the whole history unusable.
        for bar in bars {
            series.open.push(bar.open.to_f64()?);
            series.high.push(bar.high.to_f64()?);
            series.low.push(bar.low.to_f64()?);
            series.close.push(bar.close.to_f64()?);
            series.volume.push(bar.volume.to_f64()?);
        }
        Some(series)
    }
}

fn atr(series: &Series, period: usize) -> Option<f64> {
    let mut indicator = Atr::new(period).ok()?;
    let mut value = None;
    for i in 0..series.close.len() {
        let item = DataItem::builder()
            .open(series.open[i])
            .high(series.high[i])
            .low(series.low[i])
            .close(series.close[i])
            .volume(series.volume[i])
            .build()
            .ok()?;
        value = Some(indicator.next(&item));
    }
    value
}

/// Average Directional Index with Wilder smoothing. Needs at least `2 * period` bars.
pub fn wilder_adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Option<f64> {
    let n = close.len();
    if period == 0 || n < 2 * period || high.len() != n || low.len() != n {
        return None;
    }

    let mut tr = Vec::with_capacity(n - 1);
    let mut plus_dm = Vec::with_capacity(n - 1);
    let mut minus_dm = Vec::with_capacity(n - 1);
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
        let range = (high[i] - low[i])
            .max((high[i] - close[i - 1]).abs())
            .max((low[i] - close[i - 1]).abs());
        tr.push(range);
    }

    let pf = period as f64;
    let mut s_tr: f64 = tr[..period].iter().sum();
    let mut s_plus: f64 = plus_dm[..period].iter().sum();
    let mut s_minus: f64 = minus_dm[..period].iter().sum();

    let dx = |s_tr: f64, s_plus: f64, s_minus: f64| -> f64 {
        if s_tr <= 0.0 {
            return 0.0;
        }
        let plus_di = 100.0 * s_plus / s_tr;
        let minus_di = 100.0 * s_minus / s_tr;
        let sum = plus_di + minus_di;
        if sum <= 0.0 { 0.0 } else { 100.0 * (plus_di - minus_di).abs() / sum }
    };

    let mut dxs = vec![dx(s_tr, s_plus, s_minus)];
    for i in period..tr.len() {
        s_tr = s_tr - s_tr / pf + tr[i];
        s_plus = s_plus - s_plus / pf + plus_dm[i];
        s_minus = s_minus - s_minus / pf + minus_dm[i];
        dxs.push(dx(s_tr, s_plus, s_minus));
    }

    if dxs.len() < period {
        return None;
    }
    let mut adx = dxs[..period].iter().sum::<f64>() / pf;
    for value in &dxs[period..] {
        adx = (adx * (pf - 1.0) + value) / pf;
    }
    adx.is_finite().then_some(adx)
}
