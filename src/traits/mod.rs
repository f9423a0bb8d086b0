// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod disposable;
pub mod fusion;
pub mod publisher;
pub mod subscriber;
pub mod subscription;

pub use disposable::Disposable;
pub use fusion::{FusionMode, QueueSubscription};
pub use publisher::{Publisher, PublisherRef};
pub use subscriber::{Subscriber, SubscriberRef};
pub use subscription::{EmptySubscription, Subscription, SubscriptionRef};
