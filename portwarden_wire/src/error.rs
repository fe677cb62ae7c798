use std::fmt::Formatter;

#[derive(Debug)]
pub enum WireError {
    /// Device discovery failed outright (socket failure, malformed response)
    Discovery(String),
    /// Discovery produced candidates, but none resolved to a usable IGD
    NoGateway(String),
    /// The gateway already holds a conflicting entry for the requested slot
    MappingConflict(String),
    /// Any other failed gateway action
    Upnp(String),
    LocalIpAddrFail,
}

impl WireError {
    /// Whether this is the conflicting-mapping-entry class of failure, the
    /// only class remediated within a cycle.
    pub fn is_conflict(&self) -> bool {
        matches!(self, WireError::MappingConflict(_))
    }

    pub fn std(self) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, self.to_string())
    }
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                WireError::Discovery(err)
                | WireError::NoGateway(err)
                | WireError::MappingConflict(err)
                | WireError::Upnp(err) => err,
                WireError::LocalIpAddrFail => "Unable to obtain local IP info",
            }
        )
    }
}

impl std::error::Error for WireError {}

impl From<WireError> for std::io::Error {
    fn from(val: WireError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, val.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::WireError;
    use rstest::rstest;

    #[rstest]
    #[case(WireError::MappingConflict("718".to_string()), true)]
    #[case(WireError::Upnp("501".to_string()), false)]
    #[case(WireError::Discovery("timed out".to_string()), false)]
    #[case(WireError::NoGateway("none".to_string()), false)]
    #[case(WireError::LocalIpAddrFail, false)]
    fn test_conflict_classification(#[case] err: WireError, #[case] conflict: bool) {
        assert_eq!(err.is_conflict(), conflict);
    }

    #[test]
    fn test_display_carries_cause() {
        let err = WireError::Upnp("OnlyPermanentLeasesSupported".to_string());
        assert_eq!(err.to_string(), "OnlyPermanentLeasesSupported");
        let io: std::io::Error = WireError::LocalIpAddrFail.into();
        assert_eq!(io.to_string(), "Unable to obtain local IP info");
    }
}
