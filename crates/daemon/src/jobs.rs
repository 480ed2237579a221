//! Recurring job table driven by the dispatch loop.

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike, Weekday};
use watchpost_core::schedule::{AtTime, Cadence, IntervalUnit, Moment};

/// When a job fires again. All times are local wall-clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Fixed period from the last run.
    Interval(Duration),
    /// Weekly on `weekday`, at `time` or at the time of day the job was scheduled.
    Weekday { weekday: Weekday, time: Option<NaiveTime> },
    /// Every minute at `second`.
    Minutely { second: u32 },
    /// Every hour at `minute:second`.
    Hourly { minute: u32, second: u32 },
    /// Every day at the given time.
    Daily(NaiveTime),
    /// Every seven days at `time`, starting a week from scheduling.
    Weekly(NaiveTime),
}

impl Recurrence {
    /// `None` when the interval does not fit a duration.
    pub fn from_cadence(cadence: Cadence) -> Option<Self> {
        let recurrence = match cadence {
            Cadence::Every { unit, amount } => {
                let unit_secs: i64 = match unit {
                    IntervalUnit::Weekday(weekday) => {
                        return Some(Recurrence::Weekday { weekday, time: None })
                    }
                    IntervalUnit::Seconds => 1,
                    IntervalUnit::Minutes => 60,
                    IntervalUnit::Hours => 3_600,
                    IntervalUnit::Days => 86_400,
                    IntervalUnit::Weeks => 604_800,
                };
                let secs = i64::try_from(amount).ok()?.checked_mul(unit_secs)?;
                Recurrence::Interval(Duration::try_seconds(secs)?)
            }
            Cadence::At { moment, time } => match (moment, time) {
                (Moment::Minute, AtTime::Second(second)) => Recurrence::Minutely { second },
                (Moment::Hour, AtTime::MinuteSecond { minute, second }) => {
                    Recurrence::Hourly { minute, second }
                }
                (Moment::Day, AtTime::Clock(t)) => Recurrence::Daily(t),
                (Moment::Week, AtTime::Clock(t)) => Recurrence::Weekly(t),
                (Moment::Weekday(weekday), AtTime::Clock(t)) => Recurrence::Weekday {
                    weekday,
                    time: Some(t),
                },
                _ => Recurrence::Interval(Duration::seconds(1)),
            },
        };
        Some(recurrence)
    }

    /// First run strictly after `now`, or `None` when it falls outside the calendar.
    pub fn next_run(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let date = now.date();
        match *self {
            Recurrence::Interval(period) => now.checked_add_signed(period),
            Recurrence::Minutely { second } => {
                after(now, hms(date, now.hour(), now.minute(), second), Duration::minutes(1))
            }
            Recurrence::Hourly { minute, second } => {
                after(now, hms(date, now.hour(), minute, second), Duration::hours(1))
            }
            Recurrence::Daily(t) => after(now, Some(date.and_time(t)), Duration::days(1)),
            Recurrence::Weekly(t) => date.checked_add_signed(Duration::days(7)).map(|d| d.and_time(t)),
            Recurrence::Weekday { weekday, time } => {
                let t = time.unwrap_or_else(|| now.time());
                let ahead = (7 + weekday.num_days_from_monday() - now.weekday().num_days_from_monday()) % 7;
                let candidate = date
                    .checked_add_signed(Duration::days(i64::from(ahead)))?
                    .and_time(t);
                after(now, Some(candidate), Duration::weeks(1))
            }
        }
    }
}

fn hms(date: chrono::NaiveDate, h: u32, m: u32, s: u32) -> Option<NaiveDateTime> {
    NaiveTime::from_hms_opt(h, m, s).map(|t| date.and_time(t))
}

fn after(now: NaiveDateTime, candidate: Option<NaiveDateTime>, step: Duration) -> Option<NaiveDateTime> {
    match candidate {
        Some(c) if c > now => Some(c),
        Some(c) => c.checked_add_signed(step),
        None => now.checked_add_signed(step),
    }
}

/// Tag used to clear groups of jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobTag {
    /// Jobs running a validation.
    Validation,
    /// The job checking definition files for changes.
    Watcher,
}

/// A scheduled job.
#[derive(Debug, Clone)]
pub struct Job<T> {
    /// Insertion-ordered id, used to break ties between jobs due together.
    pub id: u64,
    /// Group the job is cleared with.
    pub tag: JobTag,
    /// When the job fires again.
    pub recurrence: Recurrence,
    /// Next time the job is due.
    pub next_run: NaiveDateTime,
    /// What the dispatch loop does when the job fires.
    pub payload: T,
}

/// Recurring jobs, fired by [`JobTable::pop_due`].
#[derive(Debug)]
pub struct JobTable<T> {
    jobs: Vec<Job<T>>,
    next_id: u64,
}

impl<T> Default for JobTable<T> {
    fn default() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 1,
        }
    }
}

impl<T: Clone> JobTable<T> {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `payload`, returning its id, or `None` when its first run
    /// cannot be represented.
    pub fn add(&mut self, tag: JobTag, recurrence: Recurrence, payload: T, now: NaiveDateTime) -> Option<u64> {
        let next_run = recurrence.next_run(now)?;
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.push(Job {
            id,
            tag,
            recurrence,
            next_run,
            payload,
        });
        Some(id)
    }

    /// Removes every job carrying `tag`, returning how many were dropped.
    pub fn clear_tag(&mut self, tag: JobTag) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.tag != tag);
        before - self.jobs.len()
    }

    /// Number of jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// True when no job is scheduled.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of jobs carrying `tag`.
    pub fn count(&self, tag: JobTag) -> usize {
        self.jobs.iter().filter(|j| j.tag == tag).count()
    }

    /// Jobs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Job<T>> {
        self.jobs.iter()
    }

    /// Payloads of jobs due at `now`, earliest first; each is rescheduled from `now`.
    ///
    /// A job whose next run falls outside the calendar fires this once and is dropped.
    pub fn pop_due(&mut self, now: NaiveDateTime) -> Vec<(JobTag, T)> {
        let mut due: Vec<&mut Job<T>> = self.jobs.iter_mut().filter(|j| j.next_run <= now).collect();
        due.sort_by_key(|j| (j.next_run, j.id));
        let mut exhausted = Vec::new();
        let fired: Vec<(JobTag, T)> = due
            .into_iter()
            .map(|job| {
                match job.recurrence.next_run(now) {
                    Some(next) => job.next_run = next,
                    None => exhausted.push(job.id),
                }
                (job.tag, job.payload.clone())
            })
            .collect();
        if !exhausted.is_empty() {
            self.jobs.retain(|j| !exhausted.contains(&j.id));
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn every_minutes_is_a_fixed_period() {
        let r = Recurrence::from_cadence(Cadence::Every {
            unit: IntervalUnit::Minutes,
            amount: 5,
        })
        .unwrap();
        assert_eq!(r, Recurrence::Interval(Duration::minutes(5)));
        let now = at(2024, 6, 3, 10, 0, 0);
        assert_eq!(r.next_run(now), Some(at(2024, 6, 3, 10, 5, 0)));
    }

    #[test]
    fn daily_runs_today_or_tomorrow() {
        let r = Recurrence::Daily(NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(r.next_run(at(2024, 6, 3, 8, 0, 0)), Some(at(2024, 6, 3, 9, 30, 0)));
        assert_eq!(r.next_run(at(2024, 6, 3, 9, 30, 0)), Some(at(2024, 6, 4, 9, 30, 0)));
    }

    #[test]
    fn hourly_and_minutely_align_to_clock() {
        let hourly = Recurrence::Hourly { minute: 15, second: 0 };
        assert_eq!(hourly.next_run(at(2024, 6, 3, 10, 20, 0)), Some(at(2024, 6, 3, 11, 15, 0)));
        let minutely = Recurrence::Minutely { second: 30 };
        assert_eq!(minutely.next_run(at(2024, 6, 3, 10, 20, 10)), Some(at(2024, 6, 3, 10, 20, 30)));
    }

    #[test]
    fn weekday_finds_next_matching_day() {
        // 2024-06-03 is a Monday
        let r = Recurrence::Weekday {
            weekday: Weekday::Wed,
            time: NaiveTime::from_hms_opt(8, 0, 0),
        };
        assert_eq!(r.next_run(at(2024, 6, 3, 12, 0, 0)), Some(at(2024, 6, 5, 8, 0, 0)));
        let monday = Recurrence::Weekday {
            weekday: Weekday::Mon,
            time: NaiveTime::from_hms_opt(8, 0, 0),
        };
        assert_eq!(monday.next_run(at(2024, 6, 3, 12, 0, 0)), Some(at(2024, 6, 10, 8, 0, 0)));
    }

    #[test]
    fn pop_due_reschedules_and_clear_tag_is_selective() {
        let now = at(2024, 6, 3, 10, 0, 0);
        let mut table = JobTable::new();
        table.add(JobTag::Validation, Recurrence::Interval(Duration::seconds(10)), "a", now);
        table.add(JobTag::Validation, Recurrence::Interval(Duration::seconds(30)), "b", now);
        table.add(JobTag::Watcher, Recurrence::Interval(Duration::seconds(15)), "watch", now);

        assert!(table.pop_due(now).is_empty());
        let fired = table.pop_due(now + Duration::seconds(15));
        assert_eq!(
            fired,
            vec![(JobTag::Validation, "a"), (JobTag::Watcher, "watch")]
        );
        assert!(table.pop_due(now + Duration::seconds(16)).is_empty());

        assert_eq!(table.clear_tag(JobTag::Validation), 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.count(JobTag::Watcher), 1);
    }

    #[test]
    fn out_of_calendar_runs_are_refused() {
        let now = at(2024, 6, 3, 10, 0, 0);
        let huge = Recurrence::from_cadence(Cadence::Every {
            unit: IntervalUnit::Days,
            amount: 100_000_000_000,
        })
        .unwrap();
        assert_eq!(huge.next_run(now), None);

        let mut table = JobTable::new();
        assert_eq!(table.add(JobTag::Validation, huge, "huge", now), None);
        assert!(table.is_empty());
    }

    #[test]
    fn job_without_a_next_run_is_dropped_after_firing() {
        let late = NaiveDateTime::MAX - Duration::seconds(5);
        let mut table = JobTable::new();
        table.add(JobTag::Validation, Recurrence::Interval(Duration::seconds(2)), "late", late - Duration::seconds(2));
        assert_eq!(table.pop_due(late), vec![(JobTag::Validation, "late")]);
        assert!(table.pop_due(late).is_empty());
        assert_eq!(table.len(), 1);

        let fired = table.pop_due(NaiveDateTime::MAX - Duration::seconds(1));
        assert_eq!(fired, vec![(JobTag::Validation, "late")]);
        assert!(table.is_empty());
    }
}
