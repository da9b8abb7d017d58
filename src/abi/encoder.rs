//! Call encoding against the token's interface descriptor
//!
//! Builds a static method table once from a JSON ABI, then encodes calls as
//! selector + ABI-encoded arguments and decodes call/return data back.

use std::collections::BTreeMap;

use ethers::abi::{Abi, Function, ParamType, Token};
use ethers::types::Bytes;

use crate::error::{Error, Result};

/// Encoder for calls declared by one contract interface
#[derive(Debug, Clone)]
pub struct InstructionEncoder {
    /// Overloads by method name
    methods: BTreeMap<String, Vec<Function>>,
}

impl InstructionEncoder {
    /// Build the method table from a parsed ABI
    pub fn new(abi: &Abi) -> Self {
        let methods = abi
            .functions
            .iter()
            .map(|(name, overloads)| (name.clone(), overloads.clone()))
            .collect();

        Self { methods }
    }

    /// Parse a JSON ABI array
    pub fn from_json(json: &str) -> Result<Self> {
        let abi: Abi = serde_json::from_str(json)
            .map_err(|e| Error::Descriptor(format!("Failed to parse ABI: {}", e)))?;
        Ok(Self::new(&abi))
    }

    /// Whether the interface declares a method with this name
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Encode a call to `method` with positional arguments
    pub fn encode(&self, method: &str, args: &[Token]) -> Result<Bytes> {
        let function = self.resolve(method, args)?;

        let data = function
            .encode_input(args)
            .map_err(|e| Error::Encoding(format!("{}: {}", method, e)))?;

        Ok(Bytes::from(data))
    }

    /// Decode call data into the method name and its arguments
    pub fn decode_call(&self, data: &[u8]) -> Result<(String, Vec<Token>)> {
        if data.len() < 4 {
            return Err(Error::Decoding("Call data shorter than a selector".to_string()));
        }

        let selector = &data[..4];
        let function = self
            .methods
            .values()
            .flatten()
            .find(|f| f.short_signature() == selector)
            .ok_or_else(|| {
                Error::Decoding(format!("No method with selector 0x{}", hex::encode(selector)))
            })?;

        let tokens = function
            .decode_input(&data[4..])
            .map_err(|e| Error::Decoding(format!("{}: {}", function.name, e)))?;

        Ok((function.name.clone(), tokens))
    }

    /// Decode the return data of `method`
    pub fn decode_output(&self, method: &str, data: &[u8]) -> Result<Vec<Token>> {
        let function = self
            .methods
            .get(method)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| Error::UnknownMethod(method.to_string()))?;

        function
            .decode_output(data)
            .map_err(|e| Error::Decoding(format!("{} output: {}", method, e)))
    }

    /// Human-readable signatures of every declared method, sorted by name
    pub fn signatures(&self) -> Vec<String> {
        self.methods
            .values()
            .flatten()
            .map(|f| {
                let inputs = join_types(f.inputs.iter().map(|p| &p.kind));
                let outputs = join_types(f.outputs.iter().map(|p| &p.kind));
                if outputs.is_empty() {
                    format!("{}({})", f.name, inputs)
                } else {
                    format!("{}({}) returns ({})", f.name, inputs, outputs)
                }
            })
            .collect()
    }

    /// Pick the overload whose parameter list accepts `args`
    fn resolve(&self, method: &str, args: &[Token]) -> Result<&Function> {
        let overloads = self
            .methods
            .get(method)
            .ok_or_else(|| Error::UnknownMethod(method.to_string()))?;

        if let Some(function) = overloads.iter().find(|f| accepts(f, args)) {
            return Ok(function);
        }

        // Report against the first overload with a matching arity, if any
        let reason = match overloads.iter().find(|f| f.inputs.len() == args.len()) {
            Some(function) => function
                .inputs
                .iter()
                .zip(args)
                .enumerate()
                .find(|(_, (param, arg))| !arg.type_check(&param.kind))
                .map(|(i, (param, arg))| {
                    format!(
                        "argument {} ({}) expects {}, got {}",
                        i,
                        param.name,
                        param.kind,
                        token_kind(arg)
                    )
                })
                .unwrap_or_else(|| "arguments do not match any overload".to_string()),
            None => format!(
                "expected {} arguments, got {}",
                overloads
                    .iter()
                    .map(|f| f.inputs.len().to_string())
                    .collect::<Vec<_>>()
                    .join(" or "),
                args.len()
            ),
        };

        Err(Error::ArgumentTypeMismatch {
            method: method.to_string(),
            reason,
        })
    }
}

fn accepts(function: &Function, args: &[Token]) -> bool {
    function.inputs.len() == args.len()
        && function
            .inputs
            .iter()
            .zip(args)
            .all(|(param, arg)| arg.type_check(&param.kind))
}

fn join_types<'a>(kinds: impl Iterator<Item = &'a ParamType>) -> String {
    kinds.map(|k| k.to_string()).collect::<Vec<_>>().join(",")
}

/// Runtime kind of a token, for error messages
fn token_kind(token: &Token) -> &'static str {
    match token {
        Token::Address(_) => "address",
        Token::FixedBytes(_) => "fixed bytes",
        Token::Bytes(_) => "bytes",
        Token::Int(_) => "int",
        Token::Uint(_) => "uint",
        Token::Bool(_) => "bool",
        Token::String(_) => "string",
        Token::FixedArray(_) => "fixed array",
        Token::Array(_) => "array",
        Token::Tuple(_) => "tuple",
    }
}
