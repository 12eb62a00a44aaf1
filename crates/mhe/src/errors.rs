use thiserror::Error;

/// The Result type for this library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Enum encapsulating all the possible errors from this library.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// Indicates that an error from the underlying mathematical library was
    /// encountered.
    #[error("{0}")]
    MathError(#[from] fhe_math::Error),

    /// Indicates a serialization error.
    #[error("Serialization error")]
    SerializationError,

    /// Indicates that too many values were provided.
    #[error("Too many values provided: {0} exceeds limit {1}")]
    TooManyValues(usize, usize),

    /// Indicates that too few values were provided.
    #[error("Too few values provided: {0} is below limit {1}")]
    TooFewValues(usize, usize),

    /// Indicates that an input is invalid.
    #[error("{0}")]
    UnspecifiedInput(String),

    /// Indicates a mismatch in the encodings.
    #[error("Encoding mismatch: found {0}, expected {1}")]
    EncodingMismatch(String, String),

    /// Indicates that the encoding is not supported.
    #[error("Does not support {0} encoding")]
    EncodingNotSupported(String),

    /// Indicates a parameter error.
    #[error("{0}")]
    ParametersError(ParametersError),

    /// An operand violates a precondition of the operation. The call is
    /// aborted and nothing is written to the output.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// The evaluation key set does not hold the key an operation needs.
    #[error("Missing evaluation key: {0}")]
    MissingKey(String),

    /// The operands of an addition carry different scales.
    #[error("Scale mismatch: {0} != {1}")]
    ScaleMismatch(f64, f64),

    /// Two operands are not at the same level.
    #[error("Level mismatch: expected {expected}, found {found}")]
    LevelMismatch {
        /// Level required by the operation.
        expected: usize,
        /// Level of the offending operand.
        found: usize,
    },

    /// A share cannot be folded into an accumulator.
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// A byte buffer does not follow the wire format.
    #[error("Format error: {0}")]
    Format(String),

    /// Generic error.
    #[error("{0}")]
    DefaultError(String),
}

/// Separate enum to indicate parameters-related errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParametersError {
    /// Indicates that the degree is invalid.
    #[error("Invalid degree: {0} is not a power of 2 larger than 8")]
    InvalidDegree(usize),

    /// Indicates that the moduli sizes are invalid.
    #[error("Invalid modulus size: {0}, expected an integer between {1} and {2}")]
    InvalidModulusSize(usize, usize, usize),

    /// Indicates that there exists not enough primes of this size.
    #[error("Not enough primes of size {0} for polynomials of degree {1}")]
    NotEnoughPrimes(usize, usize),

    /// Indicates that the plaintext is invalid.
    #[error("{0}")]
    InvalidPlaintext(String),

    /// Indicates that the error variance is out of range.
    #[error("Invalid variance: {0} is not between 1 and 16")]
    InvalidVariance(usize),

    /// Indicates that the gadget decomposition is invalid.
    #[error("Invalid decomposition: {0}")]
    InvalidDecomposition(String),

    /// Indicates that too many parameters were specified.
    #[error("{0}")]
    TooManySpecified(String),

    /// Indicates that too few parameters were specified.
    #[error("{0}")]
    TooFewSpecified(String),
}

impl From<ParametersError> for Error {
    fn from(e: ParametersError) -> Self {
        Error::ParametersError(e)
    }
}

/// Constructors for the errors raised by the evaluator and the protocols.
impl Error {
    /// An operand of an evaluator call holds no ring element.
    pub fn empty_operand(name: &str) -> Self {
        Self::Precondition(format!("{name} is empty"))
    }

    /// Both operands of a binary operation are plaintexts.
    pub fn plaintext_operands() -> Self {
        Self::Precondition("op0 and op1 cannot both be plaintexts".to_string())
    }

    /// The output operand cannot hold the result.
    pub fn output_degree_too_small(found: usize, minimum: usize) -> Self {
        Self::Precondition(format!(
            "output degree {found} is below the required degree {minimum}"
        ))
    }

    /// An operand is not in the domain the parameters expect.
    pub fn ntt_flag_mismatch(name: &str, expected: bool) -> Self {
        Self::Precondition(format!("{name}.is_ntt() != {expected}"))
    }

    /// An operand has an unexpected degree.
    pub fn unexpected_degree(found: usize, expected: usize) -> Self {
        Self::Precondition(format!(
            "ciphertext degree {found} where {expected} is expected"
        ))
    }

    /// A share does not have the same shape as the accumulator.
    pub fn share_dimension_mismatch(expected: (usize, usize), found: (usize, usize)) -> Self {
        Self::Aggregation(format!(
            "share has {}x{} entries, accumulator has {}x{}",
            found.0, found.1, expected.0, expected.1
        ))
    }

    /// A share is not at the level of the accumulator.
    pub fn share_level_mismatch(expected: usize, found: usize) -> Self {
        Self::Aggregation(format!(
            "share is at level {found}, accumulator is at level {expected}"
        ))
    }

    /// Fewer shares than parties were aggregated.
    pub fn insufficient_shares(provided: usize, required: usize) -> Self {
        Self::TooFewValues(provided, required)
    }

    /// More shares than parties were aggregated.
    pub fn too_many_shares(provided: usize, maximum: usize) -> Self {
        Self::TooManyValues(provided, maximum)
    }

    /// A byte buffer ended before the declared content.
    pub fn truncated(needed: usize, available: usize) -> Self {
        Self::Format(format!(
            "buffer too short: {needed} bytes needed, {available} available"
        ))
    }
}
