//! PTP operation, response and event code tables

code_table! {
    /// Operation codes sent in command requests
    pub enum OperationCode: UnknownOperation {
        GetDeviceInfo = 0x1001 => "GetDeviceInfo",
        OpenSession = 0x1002 => "OpenSession",
        CloseSession = 0x1003 => "CloseSession",
        GetStorageIds = 0x1004 => "GetStorageIDs",
        GetStorageInfo = 0x1005 => "GetStorageInfo",
        GetNumObjects = 0x1006 => "GetNumObjects",
        GetObjectHandles = 0x1007 => "GetObjectHandles",
        GetObjectInfo = 0x1008 => "GetObjectInfo",
        GetObject = 0x1009 => "GetObject",
        GetThumb = 0x100a => "GetThumb",
        DeleteObject = 0x100b => "DeleteObject",
        SendObjectInfo = 0x100c => "SendObjectInfo",
        SendObject = 0x100d => "SendObject",
        InitiateCapture = 0x100e => "InitiateCapture",
        FormatStore = 0x100f => "FormatStore",
        ResetDevice = 0x1010 => "ResetDevice",
        SelfTest = 0x1011 => "SelfTest",
        SetObjectProtection = 0x1012 => "SetObjectProtection",
        PowerDown = 0x1013 => "PowerDown",
        GetDevicePropDesc = 0x1014 => "GetDevicePropDesc",
        GetDevicePropValue = 0x1015 => "GetDevicePropValue",
        SetDevicePropValue = 0x1016 => "SetDevicePropValue",
        ResetDevicePropValue = 0x1017 => "ResetDevicePropValue",
        TerminateOpenCapture = 0x1018 => "TerminateOpenCapture",
        MoveObject = 0x1019 => "MoveObject",
        CopyObject = 0x101a => "CopyObject",
        GetPartialObject = 0x101b => "GetPartialObject",
        InitiateOpenCapture = 0x101c => "InitiateOpenCapture",

        // Sony
        SdioConnect = 0x9201 => "SDIOConnect",
        SdioGetExtDeviceInfo = 0x9202 => "SDIOGetExtDeviceInfo",
        SonyGetDevicePropDesc = 0x9203 => "SonyGetDevicePropDesc",
        SonyGetDevicePropValue = 0x9204 => "SonyGetDevicePropValue",
        SetControlDeviceA = 0x9205 => "SetControlDeviceA",
        GetControlDeviceDesc = 0x9206 => "GetControlDeviceDesc",
        SetControlDeviceB = 0x9207 => "SetControlDeviceB",
        GetAllDevicePropData = 0x9209 => "GetAllDevicePropData",
        StartMovieRec = 0x920a => "StartMovieRec",
        EndMovieRec = 0x920b => "EndMovieRec",
        TerminateCapture = 0x920c => "TerminateCapture",

        // MTP
        GetObjectPropsSupported = 0x9801 => "GetObjectPropsSupported",
        GetObjectPropDesc = 0x9802 => "GetObjectPropDesc",
        GetObjectPropValue = 0x9803 => "GetObjectPropValue",
        GetObjectPropList = 0x9805 => "GetObjectPropList",
    }
}

code_table! {
    /// Response codes carried by command responses
    pub enum ResponseCode: UnknownResponse {
        Okay = 0x2001 => "OK",
        GeneralError = 0x2002 => "GeneralError",
        SessionNotOpen = 0x2003 => "SessionNotOpen",
        InvalidTransactionId = 0x2004 => "InvalidTransactionID",
        OperationNotSupported = 0x2005 => "OperationNotSupported",
        ParameterNotSupported = 0x2006 => "ParameterNotSupported",
        IncompleteTransfer = 0x2007 => "IncompleteTransfer",
        InvalidStorageId = 0x2008 => "InvalidStorageID",
        InvalidObjectHandle = 0x2009 => "InvalidObjectHandle",
        DevicePropNotSupported = 0x200a => "DevicePropNotSupported",
        InvalidObjectFormatCode = 0x200b => "InvalidObjectFormatCode",
        StoreFull = 0x200c => "StoreFull",
        ObjectWriteProtected = 0x200d => "ObjectWriteProtected",
        StoreReadOnly = 0x200e => "StoreReadOnly",
        AccessDenied = 0x200f => "AccessDenied",
        NoThumbnailPresent = 0x2010 => "NoThumbnailPresent",
        SelfTestFailed = 0x2011 => "SelfTestFailed",
        PartialDeletion = 0x2012 => "PartialDeletion",
        StoreNotAvailable = 0x2013 => "StoreNotAvailable",
        SpecificationByFormatUnsupported = 0x2014 => "SpecificationByFormatUnsupported",
        NoValidObjectInfo = 0x2015 => "NoValidObjectInfo",
        InvalidCodeFormat = 0x2016 => "InvalidCodeFormat",
        UnknownVendorCode = 0x2017 => "UnknownVendorCode",
        CaptureAlreadyTerminated = 0x2018 => "CaptureAlreadyTerminated",
        DeviceBusy = 0x2019 => "DeviceBusy",
        InvalidParentObject = 0x201a => "InvalidParentObject",
        InvalidDevicePropFormat = 0x201b => "InvalidDevicePropFormat",
        InvalidDevicePropValue = 0x201c => "InvalidDevicePropValue",
        InvalidParameter = 0x201d => "InvalidParameter",
        SessionAlreadyOpened = 0x201e => "SessionAlreadyOpened",
        TransactionCancelled = 0x201f => "TransactionCancelled",
        SpecificationOfDestinationUnsupported = 0x2020 => "SpecificationOfDestinationUnsupported",
        InvalidEnumHandle = 0x2021 => "InvalidEnumHandle",
        NoStreamEnabled = 0x2022 => "NoStreamEnabled",
        InvalidDataSet = 0x2023 => "InvalidDataSet",

        // Eastman Kodak
        FilenameRequired = 0xa001 => "EK_FilenameRequired",
        FilenameConflicts = 0xa002 => "EK_FilenameConflicts",
        FilenameInvalid = 0xa003 => "EK_FilenameInvalid",

        // Nikon
        InvalidStatus = 0xa004 => "Nikon_InvalidStatus",
        SetPropertyNotSupported = 0xa005 => "Nikon_SetPropertyNotSupported",
        NotLiveView = 0xa00b => "Nikon_NotLiveView",
        NotReady = 0xa102 => "Nikon_NotReady",
        CannotMakeObject = 0xa104 => "Nikon_CannotMakeObject",
        MemoryStatusNotReady = 0xa106 => "Nikon_MemoryStatusNotReady",

        // Sony
        AnotherSessionOpen = 0xa101 => "Sony_AnotherSessionOpen",

        // MTP
        InvalidObjectPropCode = 0xa801 => "MTP_InvalidObjectPropCode",
        InvalidObjectPropFormat = 0xa802 => "MTP_InvalidObjectPropFormat",
        InvalidObjectPropValue = 0xa803 => "MTP_InvalidObjectPropValue",
        InvalidObjectReference = 0xa804 => "MTP_InvalidObjectReference",
        InvalidDataset = 0xa806 => "MTP_InvalidDataset",
        ObjectTooLarge = 0xa809 => "MTP_ObjectTooLarge",
        ObjectPropNotSupported = 0xa80a => "MTP_ObjectPropNotSupported",
    }
}

impl ResponseCode {
    /// Check if this is a success response
    pub fn is_success(self) -> bool {
        matches!(self, Self::Okay)
    }

    /// Check if this is an error response
    pub fn is_error(self) -> bool {
        !self.is_success()
    }
}

code_table! {
    /// Event codes carried by event packets
    pub enum EventCode: UnknownEvent {
        CancelTransaction = 0x4001 => "CancelTransaction",
        ObjectAdded = 0x4002 => "ObjectAdded",
        ObjectRemoved = 0x4003 => "ObjectRemoved",
        StoreAdded = 0x4004 => "StoreAdded",
        StoreRemoved = 0x4005 => "StoreRemoved",
        DevicePropChanged = 0x4006 => "DevicePropChanged",
        ObjectInfoChanged = 0x4007 => "ObjectInfoChanged",
        DeviceInfoChanged = 0x4008 => "DeviceInfoChanged",
        RequestObjectTransfer = 0x4009 => "RequestObjectTransfer",
        StoreFull = 0x400a => "StoreFull",
        DeviceReset = 0x400b => "DeviceReset",
        StorageInfoChanged = 0x400c => "StorageInfoChanged",
        CaptureComplete = 0x400d => "CaptureComplete",
        UnreportedStatus = 0x400e => "UnreportedStatus",

        // Sony
        SonyObjectAdded = 0xc201 => "Sony_ObjectAdded",
        SonyObjectRemoved = 0xc202 => "Sony_ObjectRemoved",
        SonyPropertyChanged = 0xc203 => "Sony_PropertyChanged",
        SonyUnknown1 = 0xc204 => "Sony_Unknown1",
        SonyUnknown2 = 0xc205 => "Sony_Unknown2",
        SonyUnknown3 = 0xc206 => "Sony_Unknown3",
        SonyUnknown4 = 0xc207 => "Sony_Unknown4",
    }
}

impl EventCode {
    /// A new object is ready on the device
    pub fn is_object_added(self) -> bool {
        matches!(self, Self::ObjectAdded | Self::SonyObjectAdded)
    }

    pub fn is_object_removed(self) -> bool {
        matches!(self, Self::ObjectRemoved | Self::SonyObjectRemoved)
    }

    /// One or more device properties changed
    pub fn is_property_changed(self) -> bool {
        matches!(self, Self::DevicePropChanged | Self::SonyPropertyChanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_operation_conversion() {
        assert_eq!(u16::from(OperationCode::OpenSession), 0x1002);
        assert_eq!(OperationCode::try_from(0x9207).unwrap(), OperationCode::SetControlDeviceB);
        assert!(matches!(
            OperationCode::try_from(0x1fff),
            Err(Error::UnknownOperation(0x1fff))
        ));
    }

    #[test]
    fn test_response_is_success() {
        assert!(ResponseCode::Okay.is_success());
        assert!(ResponseCode::AnotherSessionOpen.is_error());
        assert!(ResponseCode::DeviceBusy.is_error());
    }

    #[test]
    fn test_unknown_response() {
        assert!(ResponseCode::try_from(0x0000).is_err());
        assert!(ResponseCode::try_from(0x2024).is_err());
        assert_eq!(ResponseCode::try_from(0xa101).unwrap(), ResponseCode::AnotherSessionOpen);
    }

    #[test]
    fn test_event_kinds() {
        let added = EventCode::try_from(0xc201).unwrap();
        assert!(added.is_object_added());
        assert!(EventCode::ObjectAdded.is_object_added());
        assert!(EventCode::try_from(0xc203).unwrap().is_property_changed());
        assert!(!EventCode::SonyUnknown1.is_property_changed());
    }

    #[test]
    fn test_display() {
        assert_eq!(OperationCode::GetPartialObject.to_string(), "GetPartialObject(0x101B)");
        assert_eq!(ResponseCode::Okay.to_string(), "OK(0x2001)");
    }
}
