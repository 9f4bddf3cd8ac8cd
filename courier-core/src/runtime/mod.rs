/*
Background behaviour of a channel while it is live

consume: the per-subscription poll → handle worker
lifecycle: starts and stops that worker as a feature flag flips
*/
pub(crate) mod consume;
pub mod lifecycle;
