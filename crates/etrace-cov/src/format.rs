/// Output coverage backend, mirroring `enum cov_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CovFormat {
    #[default]
    None,
    Etrace,
    Cachegrind,
    Gcov,
    Qcov,
    Lcov,
}
