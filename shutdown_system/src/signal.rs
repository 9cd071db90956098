//! OS signals that trigger shutdown

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use crate::errors::CloserError;

/// Process signals a [`Closer`](crate::Closer) can listen for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownSignal {
    /// SIGINT, or Ctrl-C on every platform
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGHUP
    Hangup,
    /// SIGQUIT
    Quit,
}

impl ShutdownSignal {
    pub fn name(self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "interrupt",
            ShutdownSignal::Terminate => "terminate",
            ShutdownSignal::Hangup => "hangup",
            ShutdownSignal::Quit => "quit",
        }
    }

    /// Parse configured signal names, rejecting the first unknown one
    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>, CloserError> {
        names.iter().map(|name| name.as_ref().parse()).collect()
    }

    #[cfg(unix)]
    fn kind(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;

        match self {
            ShutdownSignal::Interrupt => SignalKind::interrupt(),
            ShutdownSignal::Terminate => SignalKind::terminate(),
            ShutdownSignal::Hangup => SignalKind::hangup(),
            ShutdownSignal::Quit => SignalKind::quit(),
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShutdownSignal {
    type Err = CloserError;

    /// Case-insensitive, same names as the closer configuration accepts
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interrupt" => Ok(ShutdownSignal::Interrupt),
            "terminate" => Ok(ShutdownSignal::Terminate),
            "hangup" => Ok(ShutdownSignal::Hangup),
            "quit" => Ok(ShutdownSignal::Quit),
            _ => Err(CloserError::UnknownSignal(s.to_string())),
        }
    }
}

/// Register handlers for `signals` and return a future that resolves with
/// the first one received. Handlers are installed before this returns.
///
/// Must be called from within a Tokio runtime; `signals` must not be empty.
#[cfg(unix)]
pub(crate) fn listen(
    signals: &[ShutdownSignal],
) -> Result<impl Future<Output = ShutdownSignal> + Send + 'static, CloserError> {
    use futures::future::select_all;
    use tokio::signal::unix::signal;

    let mut streams = Vec::with_capacity(signals.len());
    for &sig in signals {
        let stream = signal(sig.kind()).map_err(|source| CloserError::Signal { signal: sig, source })?;
        streams.push((sig, stream));
    }

    Ok(async move {
        let received = streams.iter_mut().map(|(sig, stream)| {
            let sig = *sig;
            Box::pin(async move {
                stream.recv().await;
                sig
            })
        });
        let (sig, _, _) = select_all(received).await;
        sig
    })
}

#[cfg(not(unix))]
pub(crate) fn listen(
    signals: &[ShutdownSignal],
) -> Result<impl Future<Output = ShutdownSignal> + Send + 'static, CloserError> {
    for sig in signals.iter().filter(|sig| **sig != ShutdownSignal::Interrupt) {
        tracing::warn!(signal = %sig, "signal not supported on this platform, ignoring");
    }

    Ok(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        ShutdownSignal::Interrupt
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("interrupt".parse::<ShutdownSignal>().unwrap(), ShutdownSignal::Interrupt);
        assert_eq!("TERMINATE".parse::<ShutdownSignal>().unwrap(), ShutdownSignal::Terminate);
        assert_eq!("Hangup".parse::<ShutdownSignal>().unwrap(), ShutdownSignal::Hangup);
        assert!("sigint".parse::<ShutdownSignal>().is_err());
        assert!(matches!(
            "usr1".parse::<ShutdownSignal>(),
            Err(CloserError::UnknownSignal(name)) if name == "usr1"
        ));
    }

    #[test]
    fn test_names_round_trip_through_config_list() {
        for name in config::KNOWN_SIGNALS {
            let sig: ShutdownSignal = name.parse().unwrap();
            assert_eq!(sig.name(), *name);
        }
    }

    #[test]
    fn test_parse_all_stops_at_unknown() {
        let parsed = ShutdownSignal::parse_all(&["interrupt", "terminate"]).unwrap();
        assert_eq!(parsed, vec![ShutdownSignal::Interrupt, ShutdownSignal::Terminate]);
        assert!(ShutdownSignal::parse_all(&["interrupt", "reload"]).is_err());
    }
}
