/// Vulkan Debug Messenger - forwards driver and validation messages to the diagnostic channel
///
/// The messenger's user data points at the device's boxed `DiagnosticChannel`,
/// which filters, counts and logs each message. The callback never aborts
/// Vulkan execution.

use ash::vk;
use colored::*;
use ibl_pipeline::ibl::diagnostics::{
    DebugMessage, DebugMessageKind, DebugMessageSeverity, DebugSeverity, DiagnosticChannel, DiagnosticStats,
};
use std::ffi::CStr;

/// Severity flags the messenger is created with for a filter
pub(crate) fn severity_flags(filter: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    let errors = vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    match filter {
        DebugSeverity::ErrorsOnly => errors,
        DebugSeverity::ErrorsAndWarnings => errors | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        DebugSeverity::All => {
            errors
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    }
}

/// Highest severity carried by the flags
pub(crate) fn message_severity(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> DebugMessageSeverity {
    if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        DebugMessageSeverity::Error
    } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        DebugMessageSeverity::Warning
    } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        DebugMessageSeverity::Info
    } else {
        DebugMessageSeverity::Verbose
    }
}

pub(crate) fn message_kind(flags: vk::DebugUtilsMessageTypeFlagsEXT) -> DebugMessageKind {
    if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        DebugMessageKind::Validation
    } else if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        DebugMessageKind::Performance
    } else {
        DebugMessageKind::General
    }
}

/// Vulkan debug messenger callback
///
/// `user_data` must point at a `DiagnosticChannel` that outlives the messenger.
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity_flags: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = &*p_callback_data;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        "Unknown".to_string()
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy().into_owned()
    };
    let message = if callback_data.p_message.is_null() {
        "No message".to_string()
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy().into_owned()
    };

    let channel = &*(user_data as *const DiagnosticChannel);
    channel.report(&DebugMessage {
        source: "Vulkan".to_string(),
        kind: message_kind(message_type),
        id: message_id_name,
        severity: message_severity(message_severity_flags),
        message,
    });

    vk::FALSE
}

/// Print the diagnostic statistics report (device shutdown)
pub(crate) fn print_diagnostic_report(stats: &DiagnosticStats, repeated: usize) {
    if stats.total() == 0 {
        println!("\n{}", "✓ No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics Report ===".bright_blue().bold());

    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());

    if repeated > 0 {
        println!("\n  {} {} message(s) appeared multiple times", "ℹ".cyan(), repeated);
    }

    println!("{}\n", "====================================".bright_blue().bold());
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
