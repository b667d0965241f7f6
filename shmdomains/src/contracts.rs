//! ABI bindings for the `.shm` domain marketplace contract.
//!
//! Domain names are emitted as *indexed strings*, so every event carries the
//! keccak-256 hash of the name instead of the name itself. The plaintext has
//! to be recovered from the calling transaction (see [`crate::decoder`]).
#![allow(missing_docs)]

use alloy::sol;

sol! {
    #[sol(rpc)]
    #[derive(Debug, PartialEq, Eq)]
    interface DomainMarketplace {
        event AuctionCreated(string indexed domainName, address indexed seller, uint256 startPrice, uint256 endTime);
        event BidPlaced(string indexed domainName, address indexed bidder, uint256 amount);
        event AuctionEnded(string indexed domainName, address indexed winner, address seller, uint256 amount);
        event OfferMade(string indexed domainName, address indexed buyer, uint256 amount, uint256 expiry);
        event OfferAccepted(string indexed domainName, address indexed buyer, address seller, uint256 amount);
        event OfferCancelled(string indexed domainName, address indexed buyer);
        event DomainSold(string indexed domainName, address indexed seller, address indexed buyer, uint256 price);

        function createAuction(string name, uint256 startPrice, uint256 duration) external;
        function placeBid(string name) external payable;
        function endAuction(string name) external;
        function makeOffer(string name, uint256 duration) external payable;
        function acceptOffer(string name, address buyer) external;
        function cancelOffer(string name) external;
        function buyDomain(string name) external payable;

        function auctions(string name) external view returns (
            address seller,
            uint256 startPrice,
            uint256 currentBid,
            address highestBidder,
            uint256 endTime,
            bool active
        );
        function offers(string name, address buyer) external view returns (
            uint256 amount,
            uint256 expiry,
            bool active
        );
    }
}
