//! Ads platform client for adbatch.
//!
//! [`AdsPlatform`] is the capability seam the batch pipeline is written
//! against; [`GraphClient`] implements it over the Graph-style ads REST API.

pub mod client;
pub mod error;
pub mod platform;
pub mod types;

pub use client::{GraphClient, GraphClientConfig};
pub use error::PlatformError;
pub use platform::AdsPlatform;
pub use types::{
    AdAccount, AdStatus, Campaign, NewAd, NewCreative, ObjectStorySpec, RawCreative, VideoData,
    VideoSource,
};
