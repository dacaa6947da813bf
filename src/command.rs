use crate::parameters::Parameter;
use crate::types::CommandKind;

/// Default command timeout in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u32 = 30;

/// A fully configured command, ready to hand to a driver.
///
/// Drivers write output values back into `parameters`; the engine then copies the list into
/// the client's parameter store.
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    pub text: String,
    pub timeout_secs: u32,
    pub parameters: Vec<Parameter>,
    /// Set when the command runs inside an explicit transaction.
    pub in_transaction: bool,
}

impl Default for Command {
    fn default() -> Self {
        Self {
            kind: CommandKind::Text,
            text: String::new(),
            timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            parameters: Vec::new(),
            in_transaction: false,
        }
    }
}

impl Command {
    /// Parameters whose value is sent to the driver.
    pub fn input_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.direction.sends_value())
    }

    /// Parameters the driver may write back into.
    pub fn output_parameters_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.parameters
            .iter_mut()
            .filter(|p| p.direction.receives_value())
    }
}
