//! Transition tables for purchase and sales orders.
//!
//! Every workflow operation names an action and asks the current status
//! whether it is permitted before any row other than the header is touched.

use std::fmt;

use crate::entities::purchase_order::PurchaseOrderStatus;
use crate::entities::sales_order::SalesOrderStatus;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOrderAction {
    Check,
    Complete,
    Cancel,
    EditItems,
    CreateReturn,
    CancelReturn,
}

impl fmt::Display for PurchaseOrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Check => "check",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
            Self::EditItems => "edit items of",
            Self::CreateReturn => "return items of",
            Self::CancelReturn => "cancel a return of",
        })
    }
}

impl PurchaseOrderStatus {
    pub fn permits(&self, action: PurchaseOrderAction) -> bool {
        use PurchaseOrderAction as A;
        use PurchaseOrderStatus as S;

        match (self, action) {
            (S::Ordered, A::Check | A::Complete | A::Cancel | A::EditItems) => true,
            (S::Completed | S::PartiallyReturned, A::CreateReturn) => true,
            (S::PartiallyReturned | S::Returned, A::CancelReturn) => true,
            _ => false,
        }
    }

    pub fn ensure(&self, action: PurchaseOrderAction) -> Result<(), ServiceError> {
        if self.permits(action) {
            Ok(())
        } else {
            Err(ServiceError::invalid_transition(
                "purchase order",
                self.to_string(),
                action.to_string(),
            ))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalesOrderAction {
    EditItems,
    Cancel,
    CreateInvoice,
    CancelInvoice,
    CreateDeliveryNote,
    CancelDeliveryNote,
    ReturnItems,
    CancelReturn,
}

impl fmt::Display for SalesOrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EditItems => "edit items of",
            Self::Cancel => "cancel",
            Self::CreateInvoice => "invoice",
            Self::CancelInvoice => "cancel the invoice of",
            Self::CreateDeliveryNote => "issue a delivery note for",
            Self::CancelDeliveryNote => "cancel the delivery note of",
            Self::ReturnItems => "return items of",
            Self::CancelReturn => "cancel a return of",
        })
    }
}

impl SalesOrderStatus {
    pub fn permits(&self, action: SalesOrderAction) -> bool {
        use SalesOrderAction as A;
        use SalesOrderStatus as S;

        match (self, action) {
            (S::Order, A::EditItems | A::Cancel | A::CreateInvoice) => true,
            (S::Invoice, A::CreateDeliveryNote | A::CancelInvoice) => true,
            (S::Delivery, A::CancelDeliveryNote) => true,
            (S::Invoice | S::Delivery | S::PartiallyReturned, A::ReturnItems) => true,
            (S::PartiallyReturned | S::Returned, A::CancelReturn) => true,
            _ => false,
        }
    }

    pub fn ensure(&self, action: SalesOrderAction) -> Result<(), ServiceError> {
        if self.permits(action) {
            Ok(())
        } else {
            Err(ServiceError::invalid_transition(
                "sales order",
                self.to_string(),
                action.to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case(PurchaseOrderStatus::Ordered, PurchaseOrderAction::Check, true)]
    #[case(PurchaseOrderStatus::Ordered, PurchaseOrderAction::Complete, true)]
    #[case(PurchaseOrderStatus::Ordered, PurchaseOrderAction::Cancel, true)]
    #[case(PurchaseOrderStatus::Ordered, PurchaseOrderAction::EditItems, true)]
    #[case(PurchaseOrderStatus::Ordered, PurchaseOrderAction::CreateReturn, false)]
    #[case(PurchaseOrderStatus::Completed, PurchaseOrderAction::Cancel, false)]
    #[case(PurchaseOrderStatus::Completed, PurchaseOrderAction::EditItems, false)]
    #[case(PurchaseOrderStatus::Completed, PurchaseOrderAction::CreateReturn, true)]
    #[case(PurchaseOrderStatus::Completed, PurchaseOrderAction::CancelReturn, false)]
    #[case(PurchaseOrderStatus::PartiallyReturned, PurchaseOrderAction::CreateReturn, true)]
    #[case(PurchaseOrderStatus::PartiallyReturned, PurchaseOrderAction::CancelReturn, true)]
    #[case(PurchaseOrderStatus::Returned, PurchaseOrderAction::CreateReturn, false)]
    #[case(PurchaseOrderStatus::Returned, PurchaseOrderAction::CancelReturn, true)]
    #[case(PurchaseOrderStatus::Cancelled, PurchaseOrderAction::Complete, false)]
    #[case(PurchaseOrderStatus::Cancelled, PurchaseOrderAction::Check, false)]
    fn purchase_transitions(
        #[case] status: PurchaseOrderStatus,
        #[case] action: PurchaseOrderAction,
        #[case] allowed: bool,
    ) {
        assert_eq!(status.permits(action), allowed);
    }

    #[rstest]
    #[case(SalesOrderStatus::Order, SalesOrderAction::EditItems, true)]
    #[case(SalesOrderStatus::Order, SalesOrderAction::Cancel, true)]
    #[case(SalesOrderStatus::Order, SalesOrderAction::CreateInvoice, true)]
    #[case(SalesOrderStatus::Order, SalesOrderAction::ReturnItems, false)]
    #[case(SalesOrderStatus::Invoice, SalesOrderAction::Cancel, false)]
    #[case(SalesOrderStatus::Invoice, SalesOrderAction::CreateInvoice, false)]
    #[case(SalesOrderStatus::Invoice, SalesOrderAction::CreateDeliveryNote, true)]
    #[case(SalesOrderStatus::Invoice, SalesOrderAction::CancelInvoice, true)]
    #[case(SalesOrderStatus::Invoice, SalesOrderAction::ReturnItems, true)]
    #[case(SalesOrderStatus::Delivery, SalesOrderAction::CancelInvoice, false)]
    #[case(SalesOrderStatus::Delivery, SalesOrderAction::CancelDeliveryNote, true)]
    #[case(SalesOrderStatus::Delivery, SalesOrderAction::ReturnItems, true)]
    #[case(SalesOrderStatus::PartiallyReturned, SalesOrderAction::CancelDeliveryNote, false)]
    #[case(SalesOrderStatus::PartiallyReturned, SalesOrderAction::ReturnItems, true)]
    #[case(SalesOrderStatus::Returned, SalesOrderAction::ReturnItems, false)]
    #[case(SalesOrderStatus::Returned, SalesOrderAction::CancelReturn, true)]
    #[case(SalesOrderStatus::Cancel, SalesOrderAction::CreateInvoice, false)]
    fn sales_transitions(
        #[case] status: SalesOrderStatus,
        #[case] action: SalesOrderAction,
        #[case] allowed: bool,
    ) {
        assert_eq!(status.permits(action), allowed);
    }

    #[test]
    fn refusal_names_current_status() {
        let err = PurchaseOrderStatus::Completed
            .ensure(PurchaseOrderAction::EditItems)
            .unwrap_err();
        assert_matches!(
            err,
            ServiceError::InvalidTransition { ref current, .. } if current == "completed"
        );
    }
}
