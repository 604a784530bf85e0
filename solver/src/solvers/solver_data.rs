use super::dd::DdSolverData;

/// Opaque state a resumable solver carries between invocations. The
/// variants are known statically; asking for the wrong variant is a
/// programmer error and panics.
pub enum SolverData {
    Dd(Box<DdSolverData>),
}

impl SolverData {
    pub fn into_dd(self) -> Box<DdSolverData> {
        match self {
            SolverData::Dd(data) => data,
        }
    }
}
