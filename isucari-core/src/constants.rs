//! Values shared by the benchmarker, the simulators and the target.

/// Card number the payment simulator always accepts
pub const CORRECT_CARD_NUMBER: &str = "AAAAAAAA";
/// Card number the payment simulator always declines
pub const FAILED_CARD_NUMBER: &str = "FA10AAAA";
/// Substring marking a declining card
pub const FAILED_CARD_MARKER: &str = "FA10";
/// Shop id of the marketplace at the payment service
pub const PAYMENT_SHOP_ID: &str = "11";
/// API key the target must send to `/token`
pub const PAYMENT_API_KEY: &str = "a15400e46c83635eb181-946abb51ff26a868317c";

/// Authorization header value the target must send to the shipment service
pub const SHIPMENT_API_TOKEN: &str = "Bearer 75ugk2m37a750fwir5xr-22l6h4wmue1bwrubzwd0";
/// Secret keying the accept-URL signature
pub const SHIPMENT_SECRET_SEED: &[u8] = b"secret-seed";

/// User agent of every benchmarker request
pub const USER_AGENT: &str = "benchmarker/isucon9-qualify";

/// Error bodies the target returns for expected rejections.
pub mod messages {
    /// Buying an item that is no longer on sale
    pub const ITEM_NOT_FOR_SALE: &str = "item is not for sale";
    /// Buying one's own item
    pub const CANNOT_BUY_OWN_ITEM: &str = "自分の商品は買えません";
    /// Payment declined
    pub const CARD_DECLINED: &str = "カードの残高が足りません";
    /// Acting on someone else's transaction
    pub const FORBIDDEN: &str = "権限がありません";
    /// Editing an item that is not on sale
    pub const EDIT_NOT_ON_SALE: &str = "販売中の商品以外編集できません";
    /// Listing price out of range
    pub const PRICE_OUT_OF_RANGE: &str =
        "商品価格は100ｲｽｺｲﾝ以上、1,000,000ｲｽｺｲﾝ以下にしてください";
    /// `ship_done` before the carrier picked the parcel up
    pub const SHIPMENT_NOT_PICKED_UP: &str =
        "shipment service側で配送中か配送完了になっていません";
}
