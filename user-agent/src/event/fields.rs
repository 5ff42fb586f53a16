// src/event/fields.rs

//! Channel names, event identifiers and `EventData` keys.

pub const SYSMON_CHANNEL: &str = "Microsoft-Windows-Sysmon/Operational";
pub const SECURITY_CHANNEL: &str = "Security";

/// Sysmon event identifiers.
pub mod sysmon {
    pub const PROCESS_CREATE: i64 = 1;
    pub const FILE_TIME: i64 = 2;
    pub const NETWORK_CONNECT: i64 = 3;
    pub const PROCESS_TERMINATE: i64 = 5;
    pub const DRIVER_LOAD: i64 = 6;
    pub const IMAGE_LOAD: i64 = 7;
    pub const CREATE_REMOTE_THREAD: i64 = 8;
    pub const ACCESS_PROCESS: i64 = 10;
    pub const FILE_CREATE: i64 = 11;
    pub const REG_SET_VALUE: i64 = 13;
    pub const CREATE_STREAM_HASH: i64 = 15;
    pub const WMI_FILTER: i64 = 19;
    pub const WMI_CONSUMER: i64 = 20;
    pub const WMI_BINDING: i64 = 21;
    pub const DNS_QUERY: i64 = 22;
    pub const FILE_DELETE: i64 = 23;
    pub const CLIPBOARD_CHANGE: i64 = 24;
    pub const PROCESS_TAMPERING: i64 = 25;
    pub const FILE_DELETE_DETECTED: i64 = 26;
}

/// Security log: an attempt was made to access an object.
pub const FS_AUDIT_OBJECT_ACCESS: i64 = 4663;

// ───── raw telemetry fields ─────────────────────────────────────────────────
pub const PROCESS_GUID: &str = "ProcessGuid";
pub const PROCESS_ID: &str = "ProcessId";
pub const IMAGE: &str = "Image";
pub const COMMAND_LINE: &str = "CommandLine";
pub const CURRENT_DIRECTORY: &str = "CurrentDirectory";
pub const USER: &str = "User";
pub const INTEGRITY_LEVEL: &str = "IntegrityLevel";
pub const HASHES: &str = "Hashes";
pub const PARENT_PROCESS_GUID: &str = "ParentProcessGuid";
pub const PARENT_IMAGE: &str = "ParentImage";
pub const PARENT_COMMAND_LINE: &str = "ParentCommandLine";
pub const SIGNED: &str = "Signed";
pub const SIGNATURE: &str = "Signature";
pub const SIGNATURE_STATUS: &str = "SignatureStatus";
pub const IMAGE_LOADED: &str = "ImageLoaded";
pub const TARGET_FILENAME: &str = "TargetFilename";
pub const SOURCE_IMAGE: &str = "SourceImage";
pub const SOURCE_PROCESS_ID: &str = "SourceProcessId";
pub const TARGET_PROCESS_ID: &str = "TargetProcessId";
/// ProcessAccess spells the GUID suffix in capitals, CreateRemoteThread does not.
pub const SOURCE_PROCESS_GUID: &str = "SourceProcessGUID";
pub const TARGET_PROCESS_GUID: &str = "TargetProcessGUID";
pub const CRT_SOURCE_PROCESS_GUID: &str = "SourceProcessGuid";
pub const CRT_TARGET_PROCESS_GUID: &str = "TargetProcessGuid";
pub const DESTINATION_IP: &str = "DestinationIp";
pub const DESTINATION_PORT: &str = "DestinationPort";
pub const UTC_TIME: &str = "UtcTime";
pub const QUERY_NAME: &str = "QueryName";
pub const QUERY_RESULTS: &str = "QueryResults";
pub const TARGET_OBJECT: &str = "TargetObject";
pub const DETAILS: &str = "Details";
pub const EVENT_TYPE: &str = "EventType";
pub const DESTINATION: &str = "Destination";
pub const ARCHIVED: &str = "Archived";
pub const OBJECT_NAME: &str = "ObjectName";

// ───── enrichment fields ────────────────────────────────────────────────────
pub const ANCESTORS: &str = "Ancestors";
pub const PARENT_USER: &str = "ParentUser";
pub const PARENT_INTEGRITY_LEVEL: &str = "ParentIntegrityLevel";
pub const PARENT_SERVICES: &str = "ParentServices";
pub const SERVICES: &str = "Services";
pub const SOURCE_SERVICES: &str = "SourceServices";
pub const TARGET_SERVICES: &str = "TargetServices";
pub const SOURCE_USER: &str = "SourceUser";
pub const SOURCE_INTEGRITY_LEVEL: &str = "SourceIntegrityLevel";
pub const SOURCE_HASHES: &str = "SourceHashes";
pub const TARGET_USER: &str = "TargetUser";
pub const TARGET_INTEGRITY_LEVEL: &str = "TargetIntegrityLevel";
pub const TARGET_PARENT_PROCESS_GUID: &str = "TargetParentProcessGuid";
pub const TARGET_HASHES: &str = "TargetHashes";
pub const SOURCE_PROCESS_SCORE: &str = "SourceProcessGeneScore";
pub const TARGET_PROCESS_SCORE: &str = "TargetProcessGeneScore";
pub const PROCESS_SCORE: &str = "ProcessGeneScore";
pub const IMAGE_HASHES: &str = "ImageHashes";
pub const IMAGE_SIGNED: &str = "ImageSigned";
pub const IMAGE_SIGNATURE: &str = "ImageSignature";
pub const IMAGE_SIGNATURE_STATUS: &str = "ImageSignatureStatus";
pub const IMAGE_SIZE: &str = "ImageSize";
pub const IMAGE_LOADED_SIZE: &str = "ImageLoadedSize";
pub const VALUE_SIZE: &str = "ValueSize";
pub const PROCESS_INTEGRITY: &str = "ProcessIntegrity";
pub const CLIPBOARD_DATA: &str = "ClipboardData";
pub const CREATE_PROCESS_COUNT: &str = "CreateProcessCount";
pub const CONNECTION_COUNT: &str = "ConnectionCount";
pub const RESOLUTION_COUNT: &str = "ResolutionCount";
pub const FILE_COUNT: &str = "FileCount";
pub const FILE_COUNT_BY_EXT: &str = "FileCountByExt";
pub const FILE_EXTENSION: &str = "FileExtension";
pub const FILE_FREQUENCY: &str = "FileFrequency";

/// Placeholder for a declared field whose value could not be resolved.
pub const UNKNOWN: &str = "?";
/// Placeholder for scores and sizes that could not be resolved.
pub const UNKNOWN_NUMBER: &str = "-1";
/// Recorded when a service name lookup fails.
pub const SERVICE_RESOLUTION_ERROR: &str = "error resolving service name";
/// `Details` value of registry events carrying binary content.
pub const BINARY_DATA: &str = "Binary Data";
