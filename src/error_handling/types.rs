use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    InvalidExecTime(i64),
    BadInterfaceCount(usize),
    InterfaceCountMismatch(usize, usize),
    BadCommand(String),
    DirectoryCreationFailed(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::InvalidExecTime(t) => {
                write!(f, "Generator execution time must be >= 0, got {}", t)
            }
            ConfigError::BadInterfaceCount(n) => {
                write!(f, "Recorder interface count must be 1 or 2, got {}", n)
            }
            ConfigError::InterfaceCountMismatch(gp, put) => write!(
                f,
                "GP and PUT recorder interface counts differ: {} vs {}",
                gp, put
            ),
            ConfigError::BadCommand(e) => write!(f, "Generator command error: {}", e),
            ConfigError::DirectoryCreationFailed(e) => write!(f, "Directory error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum GeneratorError {
    SpawnFailed(std::io::Error),
    WaitFailed(std::io::Error),
    SignalFailed(String),
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorError::SpawnFailed(e) => write!(f, "Generator spawn failed: {}", e),
            GeneratorError::WaitFailed(e) => write!(f, "Generator wait failed: {}", e),
            GeneratorError::SignalFailed(e) => write!(f, "Generator signal delivery failed: {}", e),
        }
    }
}

impl std::error::Error for GeneratorError {}

#[derive(Debug)]
pub enum CaptureError {
    InterfaceNotFound(String),
    ChannelFailed(String),
    SessionFailed(String),
    PcapReadFailed(String),
    PcapWriteFailed(String),
    IoError(std::io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::InterfaceNotFound(name) => {
                write!(f, "Capture interface not found: {}", name)
            }
            CaptureError::ChannelFailed(e) => write!(f, "Capture channel failed: {}", e),
            CaptureError::SessionFailed(e) => write!(f, "Capture session failed: {}", e),
            CaptureError::PcapReadFailed(e) => write!(f, "Pcap read failed: {}", e),
            CaptureError::PcapWriteFailed(e) => write!(f, "Pcap write failed: {}", e),
            CaptureError::IoError(e) => write!(f, "Capture IO error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::IoError(err)
    }
}

#[derive(Debug)]
pub enum DispatchError {
    UnknownTarget { bundle: String, target: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::UnknownTarget { bundle, target } => {
                write!(f, "Unknown target {} for the {} service", target, bundle)
            }
        }
    }
}

impl std::error::Error for DispatchError {}

#[derive(Debug)]
pub enum ComparatorError {
    NotConfigured,
    WrongSubServiceCount(usize),
    InterfaceCountMismatch(usize, usize),
    MissingPcapPath(String),
    CaptureError(CaptureError),
    IoError(std::io::Error),
}

impl fmt::Display for ComparatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparatorError::NotConfigured => {
                write!(f, "Comparator configuration must not be empty at this stage")
            }
            ComparatorError::WrongSubServiceCount(n) => write!(
                f,
                "Recorder must contain exactly two sub services (GP and PUT), got {}",
                n
            ),
            ComparatorError::InterfaceCountMismatch(gp, put) => write!(
                f,
                "GP and PUT capture sets differ in interface count: {} vs {}",
                gp, put
            ),
            ComparatorError::MissingPcapPath(e) => write!(f, "Missing capture file path: {}", e),
            ComparatorError::CaptureError(e) => write!(f, "Capture error: {}", e),
            ComparatorError::IoError(e) => write!(f, "Comparator IO error: {}", e),
        }
    }
}

impl std::error::Error for ComparatorError {}

impl From<CaptureError> for ComparatorError {
    fn from(err: CaptureError) -> Self {
        ComparatorError::CaptureError(err)
    }
}

impl From<std::io::Error> for ComparatorError {
    fn from(err: std::io::Error) -> Self {
        ComparatorError::IoError(err)
    }
}

#[derive(Debug)]
pub enum TestCaseError {
    ConfigError(ConfigError),
    GeneratorError(GeneratorError),
    CaptureError(CaptureError),
    DispatchError(DispatchError),
    ComparatorError(ComparatorError),
}

impl fmt::Display for TestCaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestCaseError::ConfigError(e) => write!(f, "Configuration error: {}", e),
            TestCaseError::GeneratorError(e) => write!(f, "Generator error: {}", e),
            TestCaseError::CaptureError(e) => write!(f, "Capture error: {}", e),
            TestCaseError::DispatchError(e) => write!(f, "Dispatch error: {}", e),
            TestCaseError::ComparatorError(e) => write!(f, "Comparator error: {}", e),
        }
    }
}

impl std::error::Error for TestCaseError {}

impl From<ConfigError> for TestCaseError {
    fn from(err: ConfigError) -> Self {
        TestCaseError::ConfigError(err)
    }
}

impl From<GeneratorError> for TestCaseError {
    fn from(err: GeneratorError) -> Self {
        TestCaseError::GeneratorError(err)
    }
}

impl From<CaptureError> for TestCaseError {
    fn from(err: CaptureError) -> Self {
        TestCaseError::CaptureError(err)
    }
}

impl From<DispatchError> for TestCaseError {
    fn from(err: DispatchError) -> Self {
        TestCaseError::DispatchError(err)
    }
}

impl From<ComparatorError> for TestCaseError {
    fn from(err: ComparatorError) -> Self {
        TestCaseError::ComparatorError(err)
    }
}
