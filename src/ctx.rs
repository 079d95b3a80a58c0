//! Bundles the three things every walker threads through every call (spec
//! §9 "no global mutable state" — callers pass these explicitly instead of
//! reaching for a singleton).
use crate::config::StoreConfig;
use crate::dam::{AbortFlag, DataAccessMethods};
use crate::pmm::PageModificationMethods;

pub struct Ctx<'a, D, P>
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    pub dam: &'a D,
    pub pmm: &'a P,
    pub txn: D::Txn,
    pub config: &'a StoreConfig,
    pub abort: &'a AbortFlag,
}

impl<'a, D, P> Clone for Ctx<'a, D, P>
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    fn clone(&self) -> Self {
        Ctx {
            dam: self.dam,
            pmm: self.pmm,
            txn: self.txn,
            config: self.config,
            abort: self.abort,
        }
    }
}
impl<'a, D, P> Copy for Ctx<'a, D, P>
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
}
