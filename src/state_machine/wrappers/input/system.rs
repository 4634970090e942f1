/// The [`SystemResource`] trait marks a value that can only be obtained from the running system,
/// such as the current time.
///
/// Runners call [`generate`](SystemResource::generate) and pass the result to the machine through
/// [`SystemInput::System`], keeping the machine itself free of clock reads.
pub trait SystemResource {
    /// Produce an instance of this resource from the implicit system context.
    fn generate() -> Self;
}

/// Reads the tokio clock, so runners under a paused test runtime see virtual time.
impl SystemResource for tokio::time::Instant {
    fn generate() -> Self {
        tokio::time::Instant::now()
    }
}

/// A [`StateMachine`](crate::state_machine::StateMachine) input wrapper that carries either a
/// regular input `I` or a freshly generated [`SystemResource`] `S`.
#[derive(Debug)]
pub enum SystemInput<I, S> {
    Input(I),
    System(S),
}

impl<I, S: SystemResource> SystemInput<I, S> {
    /// Sample the system resource now.
    pub fn now() -> Self {
        SystemInput::System(S::generate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_now_follows_paused_clock() {
        let start = Instant::now();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let SystemInput::<(), Instant>::System(sampled) = SystemInput::now() else {
            panic!("expected a system sample");
        };
        assert_eq!(sampled - start, Duration::from_secs(3));
    }
}
