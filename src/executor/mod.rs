mod limiter;

pub use limiter::ConcurrencyLimiter;
