use uuid::Uuid;

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================
//
// Placement is not a command: it has no prior state and goes through
// `OrderAggregate::place`.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    AttachGatewayReference {
        reference: String,
    },
    SubmitPaymentProof {
        file_path: String,
        notes: Option<String>,
        submitted_by: Uuid,
    },
    ReviewPaymentProof {
        approved: bool,
        reviewed_by: Uuid,
        admin_notes: Option<String>,
    },
    ConfirmGatewayPayment {
        payment_id: String,
    },
    FailGatewayPayment {
        reason: String,
    },
    GrantAccess {
        granted_by: Option<Uuid>,
    },
    Cancel {
        reason: String,
        cancelled_by: Option<Uuid>,
    },
    RequestRefund {
        requested_by: Uuid,
        reason: Option<String>,
    },
    ProcessRefund {
        processed_by: Uuid,
        gateway_refund_id: Option<String>,
    },
}

impl OrderCommand {
    /// Label used for metrics and logs.
    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::AttachGatewayReference { .. } => "attach_gateway_reference",
            OrderCommand::SubmitPaymentProof { .. } => "submit_payment_proof",
            OrderCommand::ReviewPaymentProof { .. } => "review_payment_proof",
            OrderCommand::ConfirmGatewayPayment { .. } => "confirm_gateway_payment",
            OrderCommand::FailGatewayPayment { .. } => "fail_gateway_payment",
            OrderCommand::GrantAccess { .. } => "grant_access",
            OrderCommand::Cancel { .. } => "cancel",
            OrderCommand::RequestRefund { .. } => "request_refund",
            OrderCommand::ProcessRefund { .. } => "process_refund",
        }
    }
}
