use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Duration;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Default, Hash)]
pub struct PositiveDuration(Duration);

impl PositiveDuration {
    #[must_use]
    pub fn new(duration: Duration) -> Option<Self> {
        duration.is_positive().then_some(Self(duration))
    }

    #[must_use]
    pub fn new_unchecked(duration: Duration) -> Self {
        Self::new(duration).expect("Duration was not positive.")
    }

    #[must_use]
    pub fn get(&self) -> Duration {
        self.0
    }

    #[must_use]
    pub fn whole_seconds(&self) -> i64 {
        self.0.whole_seconds()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The duration is not positive: {0}")]
pub struct NonPositiveDurationError(Duration);

impl TryFrom<Duration> for PositiveDuration {
    type Error = NonPositiveDurationError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(NonPositiveDurationError(value))
    }
}

/// `?page=&page_size=` query parameters. Out of range values are clamped.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct Pagination {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn first_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: first_page(),
            page_size: default_page_size(),
        }
    }
}

impl Pagination {
    #[must_use]
    pub fn page(self) -> u32 {
        self.page.max(1)
    }

    #[must_use]
    pub fn page_size(self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    #[must_use]
    pub fn limit(self) -> i64 {
        i64::from(self.page_size())
    }

    #[must_use]
    pub fn offset(self) -> i64 {
        i64::from(self.page() - 1) * self.limit()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, count: i64, pagination: Pagination) -> Self {
        Self {
            items,
            count,
            page: pagination.page(),
            page_size: pagination.page_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::util::{MAX_PAGE_SIZE, Pagination, PositiveDuration};
    use time::Duration;

    #[test]
    fn positive_duration() {
        assert!(PositiveDuration::new(Duration::seconds(1)).is_some());
        assert!(PositiveDuration::new(Duration::ZERO).is_none());
        assert!(PositiveDuration::try_from(Duration::seconds(-5)).is_err());
        assert_eq!(
            PositiveDuration::new_unchecked(Duration::minutes(15)).whole_seconds(),
            900
        );
    }

    #[test]
    fn pagination_offsets() {
        let first = Pagination::default();
        assert_eq!((first.limit(), first.offset()), (10, 0));

        let third = Pagination {
            page: 3,
            page_size: 25,
        };
        assert_eq!((third.limit(), third.offset()), (25, 50));
    }

    #[test]
    fn pagination_clamps() {
        let zeroes = Pagination {
            page: 0,
            page_size: 0,
        };
        assert_eq!((zeroes.page(), zeroes.page_size()), (1, 1));
        assert_eq!(zeroes.offset(), 0);

        let huge = Pagination {
            page: 1,
            page_size: 10_000,
        };
        assert_eq!(huge.page_size(), MAX_PAGE_SIZE);
    }
}
