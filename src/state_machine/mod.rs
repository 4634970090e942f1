pub mod retry;
pub mod wrappers;

/// The [`StateMachine`] trait describes deterministic protocol logic that is driven entirely by
/// its inputs.
///
/// # Functionality
/// A state machine consumes values of its [`Input`](StateMachine::Input) type and produces values
/// of its [`Output`](StateMachine::Output) type. Both are usually enums: each input variant maps
/// to one handler on the implementor, and each output variant to one kind of effect the caller
/// must carry out.
///
/// Inputs are fed with [`process_input`](StateMachine::process_input) and outputs are drained with
/// [`poll_output`](StateMachine::poll_output) until it returns `None`. Draining after every input
/// keeps outputs in the order the machine produced them.
///
/// # Invariants
/// Implementors *must* keep the transition logic pure so that the same inputs always produce the
/// same outputs. In particular:
///
/// - No interior mutability and no shared ownership (`Cell`, `Mutex`, `Arc`, ...). State changes
///   only through `&mut self`.
/// - No IO. Sockets, files and the terminal belong to the runner that owns the machine.
/// - No clock reads. Time is passed in as input, typically through
///   [`SystemInput`](wrappers::input::system::SystemInput).
/// - No system randomness. A generator, if needed, must be seeded through input.
/// - No threads, no async and no blocking.
///
/// Logging through `tracing` is allowed as a side effect, provided the transition logic never
/// depends on it.
///
/// # Runners
/// The impure half lives in a runner: it reads the clock, performs IO for each output and feeds
/// the results back in as input. The ground station's [`RetryClient`](crate::ground::RetryClient)
/// is the runner for [`RetryMachine`](retry::RetryMachine).
///
/// # Example
/// ```ignore
/// pub struct Toggle {
///     on: bool,
///     pending: Option<bool>,
/// }
///
/// pub enum ToggleInput {
///     Flip,
/// }
///
/// impl StateMachine for Toggle {
///     type Input = ToggleInput;
///     type Output = bool;
///
///     fn process_input(&mut self, input: Self::Input) {
///         match input {
///             ToggleInput::Flip => {
///                 self.on = !self.on;
///                 self.pending = Some(self.on);
///             }
///         }
///     }
///
///     fn poll_output(&mut self) -> Option<Self::Output> {
///         self.pending.take()
///     }
/// }
/// ```
pub trait StateMachine {
    /// The type of input that is [processed](StateMachine::process_input) by the state machine.
    type Input;
    /// The type of output that is [polled](StateMachine::poll_output) from the state machine.
    type Output;

    /// Process the provided `input`, dispatching to the matching handler.
    fn process_input(&mut self, input: Self::Input);

    /// Return the oldest pending output, if any.
    fn poll_output(&mut self) -> Option<Self::Output>;
}
