// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::de::IntoDeserializer;
use std::{fmt, time::Duration};

/// Deserializes the heartbeat-interval key: a duration, or an empty string to disable heartbeats.
///
/// The outer `Option` is `None` when the key isn't set (so that another profile's value applies).
pub(super) fn deserialize_heartbeat_interval<'de, D>(
    deserializer: D,
) -> Result<Option<Option<Duration>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct V;

    impl serde::de::Visitor<'_> for V {
        type Value = Option<Option<Duration>>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a duration (\"10s\") or an empty string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v.is_empty() {
                Ok(Some(None))
            } else {
                let interval = humantime_serde::deserialize(v.into_deserializer())?;
                Ok(Some(Some(interval)))
            }
        }
    }

    deserializer.deserialize_any(V)
}
