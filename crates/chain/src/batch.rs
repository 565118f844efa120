//! Programmable call batches.
//!
//! A [`CallBatch`] is an ordered, append-only list of commands that the ledger
//! executes atomically. Inputs are recorded unresolved (object ids plus the
//! access they need); the ledger adapter turns them into versioned object
//! arguments right before simulation or submission.
//!
//! ```rust,ignore
//! let mut batch = CallBatch::new();
//! let market = batch.shared_object(market_id, true);
//! let clock = batch.clock();
//! let orders = batch.move_call(MoveTarget::new(pkg, "trade", "valid_order_addresses"), types, vec![market, clock]);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::types::{ObjectId, ObjectRef, SuiAddress, TypeTag};

/// A value passed to a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Argument {
    /// The coin paying for gas.
    GasCoin,
    /// One of the batch inputs.
    Input(u16),
    /// The single result of an earlier command.
    Result(u16),
    /// One element of a multi-value result of an earlier command.
    NestedResult(u16, u16),
}

impl Argument {
    /// Select output `index` of a command result.
    ///
    /// Only meaningful on [`Argument::Result`]; other variants are returned as is.
    pub fn nested(self, index: u16) -> Argument {
        match self {
            Argument::Result(cmd) => Argument::NestedResult(cmd, index),
            other => other,
        }
    }
}

/// Fully qualified Move function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveTarget {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
}

impl MoveTarget {
    pub fn new(package: ObjectId, module: &str, function: &str) -> Self {
        Self {
            package,
            module: module.to_string(),
            function: function.to_string(),
        }
    }
}

impl std::fmt::Display for MoveTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}::{}", self.package, self.module, self.function)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgrammableMoveCall {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
    pub type_arguments: Vec<TypeTag>,
    pub arguments: Vec<Argument>,
}

/// One command of a programmable transaction.
///
/// Variant order follows the ledger's BCS layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    MoveCall(Box<ProgrammableMoveCall>),
    TransferObjects(Vec<Argument>, Argument),
    SplitCoins(Argument, Vec<Argument>),
    MergeCoins(Argument, Vec<Argument>),
    Publish(Vec<Vec<u8>>, Vec<ObjectId>),
    MakeMoveVec(Option<TypeTag>, Vec<Argument>),
    Upgrade(Vec<Vec<u8>>, Vec<ObjectId>, ObjectId, Argument),
}

impl Command {
    /// `module::function` for move calls, the command kind otherwise.
    pub fn label(&self) -> String {
        match self {
            Command::MoveCall(call) => format!("{}::{}", call.module, call.function),
            Command::TransferObjects(..) => "TransferObjects".to_string(),
            Command::SplitCoins(..) => "SplitCoins".to_string(),
            Command::MergeCoins(..) => "MergeCoins".to_string(),
            Command::Publish(..) => "Publish".to_string(),
            Command::MakeMoveVec(..) => "MakeMoveVec".to_string(),
            Command::Upgrade(..) => "Upgrade".to_string(),
        }
    }
}

/// Batch input before object versions are known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchInput {
    /// BCS-encoded pure value.
    Pure(Vec<u8>),
    /// Object by id; `mutable` only matters for shared objects.
    Object { id: ObjectId, mutable: bool },
}

/// Object argument in its resolved, versioned form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectArg {
    ImmOrOwnedObject(ObjectRef),
    SharedObject {
        id: ObjectId,
        initial_shared_version: u64,
        mutable: bool,
    },
    Receiving(ObjectRef),
}

/// Resolved batch input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArg {
    Pure(Vec<u8>),
    Object(ObjectArg),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgrammableTransaction {
    pub inputs: Vec<CallArg>,
    pub commands: Vec<Command>,
}

/// Only the programmable variant is ever built by the keeper.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    ProgrammableTransaction(ProgrammableTransaction),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasData {
    pub payment: Vec<ObjectRef>,
    pub owner: SuiAddress,
    pub price: u64,
    pub budget: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionExpiration {
    None,
    Epoch(u64),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDataV1 {
    pub kind: TransactionKind,
    pub sender: SuiAddress,
    pub gas_data: GasData,
    pub expiration: TransactionExpiration,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionData {
    V1(TransactionDataV1),
}

/// Ordered, append-only sequence of calls sharing one atomic execution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallBatch {
    inputs: Vec<BatchInput>,
    commands: Vec<Command>,
}

impl CallBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls appended so far. Call `i` produces result slot `i`.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn inputs(&self) -> &[BatchInput] {
        &self.inputs
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Add a BCS-encoded pure input.
    pub fn pure<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<Argument, ChainError> {
        let bytes = bcs::to_bytes(value)?;
        Ok(self.push_input(BatchInput::Pure(bytes)))
    }

    /// Add an object input. Repeated ids share one input; the widest access wins.
    pub fn object(&mut self, id: ObjectId, mutable: bool) -> Argument {
        for (i, input) in self.inputs.iter_mut().enumerate() {
            if let BatchInput::Object { id: existing, mutable: m } = input {
                if *existing == id {
                    *m |= mutable;
                    return Argument::Input(i as u16);
                }
            }
        }
        self.push_input(BatchInput::Object { id, mutable })
    }

    /// The system clock, always read-only.
    pub fn clock(&mut self) -> Argument {
        self.object(SuiAddress::CLOCK, false)
    }

    fn push_input(&mut self, input: BatchInput) -> Argument {
        self.inputs.push(input);
        Argument::Input((self.inputs.len() - 1) as u16)
    }

    fn push_command(&mut self, command: Command) -> Argument {
        self.commands.push(command);
        Argument::Result((self.commands.len() - 1) as u16)
    }

    /// Append a Move call and return a handle to its result.
    pub fn move_call(
        &mut self,
        target: MoveTarget,
        type_arguments: Vec<TypeTag>,
        arguments: Vec<Argument>,
    ) -> Argument {
        self.push_command(Command::MoveCall(Box::new(ProgrammableMoveCall {
            package: target.package,
            module: target.module,
            function: target.function,
            type_arguments,
            arguments,
        })))
    }

    /// Split `amounts` off `coin`; the new coins are nested results `0..amounts.len()`.
    pub fn split_coins(&mut self, coin: Argument, amounts: Vec<Argument>) -> Argument {
        self.push_command(Command::SplitCoins(coin, amounts))
    }

    /// Resolve inputs through `resolve` and produce the programmable transaction.
    pub fn to_programmable<F>(&self, mut resolve: F) -> Result<ProgrammableTransaction, ChainError>
    where
        F: FnMut(ObjectId, bool) -> Result<ObjectArg, ChainError>,
    {
        let inputs = self
            .inputs
            .iter()
            .map(|input| match input {
                BatchInput::Pure(bytes) => Ok(CallArg::Pure(bytes.clone())),
                BatchInput::Object { id, mutable } => resolve(*id, *mutable).map(CallArg::Object),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProgrammableTransaction {
            inputs,
            commands: self.commands.clone(),
        })
    }

    /// Labels of every call in order, for logs and assertions.
    pub fn call_labels(&self) -> Vec<String> {
        self.commands.iter().map(Command::label).collect()
    }
}
