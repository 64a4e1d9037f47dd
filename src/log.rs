#[cfg(feature = "tracing")]
#[allow(unused_imports)]
mod log_impl {
    pub(crate) use tracing::debug;
    pub(crate) use tracing::error;
    pub(crate) use tracing::info;
    pub(crate) use tracing::instrument;
    pub(crate) use tracing::trace;
    pub(crate) use tracing::warn;
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_imports, unused_macros)]
mod log_impl {
    macro_rules! debug {
        ($($args:tt)*) => {{
            if false {
                let _args = ::std::format!($($args)*);
            }
        }};
    }
    pub(crate) use debug;
    pub(crate) use debug as error;
    pub(crate) use debug as info;
    pub(crate) use debug as trace;
    pub(crate) use debug as warn;
}

#[allow(unused_imports)]
pub(crate) use log_impl::*;
