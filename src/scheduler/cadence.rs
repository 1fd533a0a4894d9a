use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

/// 毎日決まった UTC 時刻に発火するスケジュール。
#[derive(Debug, Clone)]
pub(crate) struct DailyCadence {
    target: NaiveTime,
}

impl DailyCadence {
    pub(crate) fn new(hour: u32, minute: u32) -> Self {
        let target = NaiveTime::from_hms_opt(hour, minute, 0)
            .unwrap_or_else(|| panic!("invalid time: {hour:02}:{minute:02}"));
        Self { target }
    }

    pub(crate) fn next_run_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = now.date_naive();
        if now.time() > self.target {
            date = advance_day(date);
        }
        Utc.from_utc_datetime(&date.and_time(self.target))
    }
}

fn advance_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt()
        .expect("date should remain representable when advancing")
}
