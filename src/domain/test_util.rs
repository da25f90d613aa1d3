use anyhow::anyhow;

/// Connectivity represents the "connected" state of an in-memory driven port and provides
/// common behavior for returning an error if the port is configured to be in a disconnected state.
pub enum Connectivity {
    Connected,
    Disconnected,
}

impl Connectivity {
    /// Return an error if connectivity is in a "disconnected" state
    pub fn blow_up_if_disconnected(&self) -> Result<(), anyhow::Error> {
        match self {
            Self::Connected => Ok(()),
            Self::Disconnected => Err(anyhow!("could not connect to service!")),
        }
    }
}

/// Stands in for one method of a mocked async trait: records the arguments of every call and
/// hands back a preconfigured return value. Async trait methods don't play well with mockall,
/// so driving port mocks are assembled out of these.
///
/// * `Args` is whatever gets captured per call, usually a tuple of the interesting arguments
/// * `Ret` is the method's return type
///
/// ```ignore
/// struct MockCounter {
///     bump_result: FakeImplementation<i64, Result<i64, CounterError>>,
/// }
///
/// impl Counter for Mutex<MockCounter> {
///     async fn bump(&self, by: i64) -> Result<i64, CounterError> {
///         let mut locked_self = self.lock().expect("mock counter mutex poisoned");
///         locked_self.bump_result.save_arguments(by);
///
///         locked_self.bump_result.return_value_result()
///     }
/// }
/// ```
pub struct FakeImplementation<Args, Ret> {
    saved_arguments: Vec<Args>,
    return_value: Option<Ret>,
}

impl<Args, Ret> FakeImplementation<Args, Ret> {
    pub fn new() -> FakeImplementation<Args, Ret> {
        FakeImplementation {
            saved_arguments: Vec::new(),
            return_value: None,
        }
    }

    /// Saves arguments from a single invocation of the FakeImplementation
    pub fn save_arguments(&mut self, arguments: Args) {
        self.saved_arguments.push(arguments)
    }

    /// Returns the list of arguments passed on every call to this FakeImplementation
    pub fn calls(&self) -> &[Args] {
        self.saved_arguments.as_slice()
    }
}

impl<Args, Success, Fail> FakeImplementation<Args, Result<Success, Fail>>
where
    Success: Clone,
    Fail: Clone,
{
    /// Set the result that should be returned when this FakeImplementation is invoked
    pub fn set_returned_result(&mut self, return_value: Result<Success, Fail>) {
        self.return_value = Some(return_value)
    }

    /// Retrieve the configured result. Panics if the test never configured one, since that
    /// means the code under test made a call the test didn't expect.
    pub fn return_value_result(&self) -> Result<Success, Fail> {
        match self.return_value {
            Some(Ok(ref ok_result)) => Ok(ok_result.clone()),
            Some(Err(ref err)) => Err(err.clone()),
            None => panic!("Tried to return from a function where the return value wasn't set!"),
        }
    }
}
