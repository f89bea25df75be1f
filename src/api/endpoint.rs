pub type Endpoint = str;

pub const LOGIN: &Endpoint = "newTwoLoginAPI.do";
pub const PLANT_DETAIL: &Endpoint = "newPlantDetailAPI.do";
/* Device listing, tried in this order */
pub const DEVICES: &Endpoint = "newTwoPlantAPI.do";
pub const DEVICES_FALLBACK: &Endpoint = "panel/getDevicesByPlantList";
/* Storage (battery inverter) endpoints, all answer with an `obj` envelope */
pub const STORAGE: &Endpoint = "newStorageAPI.do";

pub const OP_DEVICE_LIST: &str = "getAllDeviceList";
pub const OP_STORAGE_DETAIL: &str = "getStorageInfo_sacolar";
pub const OP_ENERGY_OVERVIEW: &str = "getEnergyOverviewData_sacolar";
pub const OP_STORAGE_PARAMS: &str = "getStorageParams_sacolar";
