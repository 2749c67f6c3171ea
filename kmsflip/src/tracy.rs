//! Tracy profiling integration
//!
//! Macros that compile to nothing unless the `profile-with-tracy` feature is
//! enabled.
//!
//! # Usage
//!
//! ```ignore
//! fn flip(&mut self) {
//!     tracy_span!("Device::flip", self.connector);
//!     // ...
//!     tracy_frame_mark!("flip");
//! }
//! ```
//!
//! A main frame is one pass of `Session::render_frame` over every output.
//! Each device flip is also marked in a secondary frame set, so outputs that
//! fall behind show up as gaps next to the main frames.

/// Create a Tracy span for the current scope, optionally tagged with the
/// connector it works on.
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_span {
    ($name:expr) => {
        let _span = tracy_client::span!($name);
    };
    ($name:expr, $connector:expr) => {
        let _span = tracy_client::span!($name);
        _span.emit_text(&format!("connector {}", $connector));
    };
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_span {
    ($name:expr) => {};
    ($name:expr, $connector:expr) => {};
}

/// Mark the end of a render pass, or with a name, one event in a secondary
/// frame set.
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_frame_mark {
    () => {
        if let Some(client) = tracy_client::Client::running() {
            client.frame_mark();
        }
    };
    ($name:literal) => {
        if let Some(client) = tracy_client::Client::running() {
            client.secondary_frame_mark(tracy_client::frame_name!($name));
        }
    };
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_frame_mark {
    () => {};
    ($name:literal) => {};
}

/// Record a plot value, e.g. the number of presenting devices.
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_plot {
    ($name:expr, $value:expr) => {{
        static PLOT: std::sync::OnceLock<tracy_client::PlotName> = std::sync::OnceLock::new();
        let name = PLOT.get_or_init(|| tracy_client::plot_name!($name));
        if let Some(client) = tracy_client::Client::running() {
            client.plot(*name, $value as f64);
        }
    }};
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_plot {
    ($name:expr, $value:expr) => {};
}

/// Start the Tracy client. Returns whether profiling is compiled in.
pub fn start_profiler() -> bool {
    #[cfg(feature = "profile-with-tracy")]
    {
        tracy_client::Client::start();
        true
    }
    #[cfg(not(feature = "profile-with-tracy"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::ConnectorId;

    /// The macros expand in every arm whether or not the feature is on.
    #[test]
    fn test_macros_expand() {
        let _connector = ConnectorId(36);
        let _flipped = 2usize;
        {
            tracy_span!("test span");
            tracy_span!("test span", _connector);
            tracy_plot!("test plot", _flipped);
            tracy_frame_mark!("test flip");
            tracy_frame_mark!();
        }
        assert_eq!(super::start_profiler(), cfg!(feature = "profile-with-tracy"));
    }
}
