//! Audit note text for each reconciliation step.
//!
//! Mirrors the message tables the original automation kept on each resource
//! handler (one array of templates per outcome), just grouped by operation
//! instead of embedded in the handler class.

pub mod storage_account {
    pub fn created(name: &str) -> String {
        format!("storage account [{name}] created")
    }
    pub fn adopted(name: &str) -> String {
        format!("storage account [{name}] exists and was created by us before")
    }
    pub fn adopted_foreign(name: &str) -> String {
        format!("storage account [{name}] exists but was not created by us before")
    }
    pub fn name_unavailable(name: &str) -> String {
        format!("storage account [{name}] name not available")
    }
    pub fn quota_exhausted(name: &str) -> String {
        format!("storage account [{name}] subscription not enough")
    }
}

pub mod cloud_service {
    pub fn created(name: &str) -> String {
        format!("cloud service [{name}] created")
    }
    pub fn adopted(name: &str) -> String {
        format!("cloud service [{name}] exists and was created by us before")
    }
    pub fn adopted_foreign(name: &str) -> String {
        format!("cloud service [{name}] exists but was not created by us before")
    }
}

pub mod deployment {
    pub fn created(name: &str) -> String {
        format!("deployment [{name}] created")
    }
    pub fn adopted(name: &str) -> String {
        format!("deployment [{name}] exists and was created by us before")
    }
    pub fn adopted_foreign(name: &str) -> String {
        format!("deployment [{name}] exists but was not created by us before")
    }
    pub fn async_wait_failed(name: &str) -> String {
        format!("deployment [{name}] wait for async fail")
    }
    pub fn deleted(name: &str) -> String {
        format!("deployment [{name}] deleted")
    }
}

pub mod virtual_machine {
    pub fn created(name: &str) -> String {
        format!("virtual machine [{name}] created")
    }
    pub fn adopted(name: &str) -> String {
        format!("virtual machine [{name}] exists and was created by us before")
    }
    pub fn adopted_foreign(name: &str) -> String {
        format!("virtual machine [{name}] exists but was not created by us before")
    }
    pub fn quota_exhausted(name: &str) -> String {
        format!("virtual machine [{name}] subscription not enough")
    }
    pub fn async_wait_failed(name: &str) -> String {
        format!("virtual machine [{name}] wait for async fail")
    }
    pub fn network_update_wait_failed(name: &str) -> String {
        format!("virtual machine [{name}] wait for async fail (update network config)")
    }
    pub fn stopped(name: &str, action: &str) -> String {
        format!("virtual machine [{name}] {action}")
    }
    pub fn stopped_previously(name: &str, action: &str) -> String {
        format!("virtual machine [{name}] {action} and by us before")
    }
    pub fn stopped_previously_foreign(name: &str, action: &str) -> String {
        format!("virtual machine [{name}] {action} but not by us before")
    }
    pub fn wrong_state_for_stop(name: &str, wanted: &str, got: &str) -> String {
        format!("virtual machine [{name}] need status {wanted} but now status {got}")
    }
    pub fn started(name: &str) -> String {
        format!("virtual machine [{name}] started")
    }
    pub fn started_previously(name: &str) -> String {
        format!("virtual machine [{name}] started by us before")
    }
    pub fn started_previously_foreign(name: &str) -> String {
        format!("virtual machine [{name}] started but not by us before")
    }
    pub fn deleted(name: &str) -> String {
        format!("virtual machine [{name}] deleted")
    }
}

pub mod endpoint {
    pub fn replaced(virtual_machine: &str, count: usize) -> String {
        format!("virtual machine [{virtual_machine}] endpoints replaced ({count} total)")
    }
}
