use chrono::{DateTime, Utc};

/// ユーザーの最終生成時刻。ストア由来のタイムスタンプ形式と、旧データに残る
/// エポック秒形式の両方を受け付ける。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastGeneration {
    Timestamp(DateTime<Utc>),
    EpochSeconds(i64),
}

impl LastGeneration {
    fn as_timestamp(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(timestamp) => Some(timestamp),
            Self::EpochSeconds(seconds) => DateTime::from_timestamp(seconds, 0),
        }
    }
}

/// 新しいエピソードを生成すべきかを判定する。
///
/// 最終生成時刻が無い場合は常に生成対象。ある場合は経過日数（切り捨て）が
/// `interval_days` 以上なら生成対象。ちょうど `interval_days` 日経過した時点で
/// 対象になる。
#[must_use]
pub fn is_due(last: Option<LastGeneration>, interval_days: u32, now: DateTime<Utc>) -> bool {
    let Some(last) = last else {
        return true;
    };
    // Unrepresentable epoch values are treated like an absent marker.
    let Some(timestamp) = last.as_timestamp() else {
        return true;
    };
    now.signed_duration_since(timestamp).num_days() >= i64::from(interval_days)
}
