use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeriesError {
    #[error("Out-of-order data point: {got} is not after {last}")]
    OutOfOrder { last: NaiveDate, got: NaiveDate },

    #[error("The series has no origin date; reset it before appending implicit points")]
    NoOrigin,

    #[error("Date arithmetic overflowed after {0}")]
    DateOverflow(NaiveDate),
}
